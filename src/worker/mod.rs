//! Worker process management and framed pipe I/O.
//!
//! A worker is any executable that reads request frames on stdin and writes
//! reply frames on stdout. The host drives it in strict lockstep: one
//! request, then exactly one reply.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Host (Rust + Tokio)                    │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                    WorkerChannel                       │  │
//! │  │  - whole-frame send / receive                          │  │
//! │  │  - optional receive timeout, frame size guard          │  │
//! │  │  - any failure terminates the worker                   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                    WorkerHandle                        │  │
//! │  │  - spawn with piped stdin/stdout, inherited stderr     │  │
//! │  │  - SIGTERM, grace period, SIGKILL, reap                │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                              │                               │
//! │            stdin (requests)  │  stdout (replies)             │
//! │                              ▼                               │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Worker (external child process)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rowpipe::worker::{ChannelOptions, WorkerChannel, WorkerCommand, WorkerHandle};
//! use rowpipe::wire::{Frame, WireFormat};
//!
//! let handle = WorkerHandle::spawn(&WorkerCommand::new("./my-worker")).await?;
//! let mut channel = WorkerChannel::new(handle, ChannelOptions::new(WireFormat::Text));
//!
//! channel.send(&Frame::Text { row_count: 1, body: b"1\n".to_vec() }).await?;
//! let reply = channel.receive(false).await?;
//!
//! channel.terminate().await;
//! ```

mod channel;
mod process;

pub use channel::{ChannelOptions, WorkerChannel, DEFAULT_MAX_FRAME_BYTES};
pub use process::{WorkerCommand, WorkerHandle, DEFAULT_SHUTDOWN_GRACE};
