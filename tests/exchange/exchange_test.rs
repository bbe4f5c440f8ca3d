use rowpipe::codec::TextCodec;
use rowpipe::exchange::{Exchange, MemorySink, MemorySource, OutputCursor};
use rowpipe::types::{DataType, Field, RowBatch, Schema, Value};
use rowpipe::wire::WireFormat;
use rowpipe::worker::{ChannelOptions, WorkerCommand};
use rowpipe::{ErrorClass, ExchangeError};
use std::time::Duration;

fn echo_worker(format: &str, mode: &str) -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_rowpipe-echo"))
        .args([format, mode])
        .with_shutdown_grace(Duration::from_millis(100))
}

fn mixed_schema() -> Schema {
    Schema::new(vec![
        Field::new("n", DataType::Int64),
        Field::new("name", DataType::Utf8),
        Field::new("score", DataType::Float64),
    ])
}

fn mixed_rows(count: i64) -> Vec<Vec<Value>> {
    (0..count)
        .map(|i| {
            vec![
                Value::Int64(i),
                if i % 4 == 1 {
                    Value::Null
                } else {
                    Value::from(format!("row\t{}", i))
                },
                Value::Float64(i as f64 * 0.25),
            ]
        })
        .collect()
}

async fn run(
    command: WorkerCommand,
    format: WireFormat,
    input: Schema,
    output: Schema,
    source: &mut MemorySource,
) -> (rowpipe::exchange::ExchangeSummary, MemorySink) {
    let exchange = Exchange::spawn(
        &command,
        input,
        output,
        TextCodec::default(),
        ChannelOptions::new(format),
    )
    .await
    .unwrap();
    let mut sink = MemorySink::new();
    let summary = exchange.run(source, &mut sink).await.unwrap();
    (summary, sink)
}

#[tokio::test]
async fn test_text_echo_round_trip() {
    let rows = mixed_rows(10);
    let mut source = MemorySource::from_rows(mixed_schema(), rows.clone(), 3).unwrap();
    let (summary, sink) = run(
        echo_worker("text", "echo"),
        WireFormat::Text,
        mixed_schema(),
        mixed_schema(),
        &mut source,
    )
    .await;

    assert!(!summary.aborted(), "{}", summary);
    assert_eq!(summary.batches_sent, 4);
    assert_eq!(summary.replies_appended, 4);
    assert_eq!(summary.rows_sent, 10);
    assert_eq!(summary.rows_received, 10);
    assert_eq!(sink.rows(), rows);
    assert!(sink.is_finished());

    let cursors: Vec<OutputCursor> = sink.batches().iter().map(|(c, _)| *c).collect();
    assert_eq!(
        cursors,
        vec![
            OutputCursor { chunk: 0, row: 0 },
            OutputCursor { chunk: 1, row: 3 },
            OutputCursor { chunk: 2, row: 6 },
            OutputCursor { chunk: 3, row: 9 },
        ]
    );
}

#[tokio::test]
async fn test_text_hello_across_partial_writes() {
    let input = Schema::from_types(&[DataType::Utf8]);
    let output = Schema::new(vec![
        Field::new("greeting", DataType::Utf8),
        Field::new("who", DataType::Utf8),
    ]);
    let rows = vec![vec![Value::from("world")], vec![Value::from("there")]];
    let mut source = MemorySource::from_rows(input.clone(), rows, 10).unwrap();

    let (summary, sink) = run(
        echo_worker("text", "hello"),
        WireFormat::Text,
        input,
        output,
        &mut source,
    )
    .await;

    assert!(!summary.aborted(), "{}", summary);
    assert_eq!(
        sink.rows(),
        vec![
            vec![Value::from("Hello"), Value::from("world")],
            vec![Value::from("Hello"), Value::from("there")],
        ]
    );
}

#[tokio::test]
async fn test_text_summarize_replies_on_drain() {
    let input = Schema::from_types(&[DataType::Int64]);
    let rows = (0..7).map(|i| vec![Value::Int64(i)]).collect();
    let mut source = MemorySource::from_rows(input.clone(), rows, 2).unwrap();

    let (summary, sink) = run(
        echo_worker("text", "summarize"),
        WireFormat::Text,
        input,
        Schema::from_types(&[DataType::Int64]),
        &mut source,
    )
    .await;

    assert!(!summary.aborted(), "{}", summary);
    assert_eq!(summary.batches_sent, 4);
    assert_eq!(summary.replies_appended, 1);
    assert_eq!(sink.rows(), vec![vec![Value::Int64(7)]]);
    assert_eq!(sink.batches()[0].0, OutputCursor::default());
}

#[tokio::test]
async fn test_empty_source_only_drains() {
    let input = Schema::from_types(&[DataType::Int64]);
    let mut source = MemorySource::new(input.clone(), vec![]);

    let (summary, sink) = run(
        echo_worker("text", "summarize"),
        WireFormat::Text,
        input,
        Schema::from_types(&[DataType::Int64]),
        &mut source,
    )
    .await;

    assert_eq!(summary.batches_sent, 0);
    assert_eq!(sink.rows(), vec![vec![Value::Int64(0)]]);
}

#[tokio::test]
async fn test_empty_input_batches_are_not_sent() {
    let input = Schema::from_types(&[DataType::Int64]);
    let batches = vec![
        RowBatch::empty(&input),
        RowBatch::from_rows(&input, vec![vec![Value::Int64(5)]]).unwrap(),
        RowBatch::empty(&input),
    ];
    let mut source = MemorySource::new(input.clone(), batches);

    let (summary, sink) = run(
        echo_worker("text", "echo"),
        WireFormat::Text,
        input.clone(),
        input,
        &mut source,
    )
    .await;

    assert!(!summary.aborted(), "{}", summary);
    assert_eq!(summary.batches_sent, 1);
    assert_eq!(sink.rows(), vec![vec![Value::Int64(5)]]);
}

#[tokio::test]
async fn test_binary_echo_round_trip() {
    let rows = mixed_rows(25);
    let mut source = MemorySource::from_rows(mixed_schema(), rows.clone(), 10).unwrap();
    let (summary, sink) = run(
        echo_worker("binary", "echo"),
        WireFormat::Binary,
        mixed_schema(),
        mixed_schema(),
        &mut source,
    )
    .await;

    assert!(!summary.aborted(), "{}", summary);
    assert_eq!(summary.batches_sent, 3);
    assert_eq!(sink.rows(), rows);
    assert_eq!(sink.batches()[2].0, OutputCursor { chunk: 2, row: 20 });
}

#[tokio::test]
async fn test_binary_zero_column_replies_keep_streaming() {
    let rows = mixed_rows(6);
    let mut source = MemorySource::from_rows(mixed_schema(), rows, 2).unwrap();
    let (summary, sink) = run(
        echo_worker("binary", "empty"),
        WireFormat::Binary,
        mixed_schema(),
        mixed_schema(),
        &mut source,
    )
    .await;

    assert!(!summary.aborted(), "{}", summary);
    assert_eq!(summary.batches_sent, 3);
    assert_eq!(summary.rows_received, 0);
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn test_binary_column_count_mismatch_aborts() {
    let rows = mixed_rows(4);
    let mut source = MemorySource::from_rows(mixed_schema(), rows, 2).unwrap();
    let (summary, sink) = run(
        echo_worker("binary", "drop-column"),
        WireFormat::Binary,
        mixed_schema(),
        mixed_schema(),
        &mut source,
    )
    .await;

    let err = summary.error.as_ref().expect("exchange should abort");
    assert!(matches!(
        err,
        ExchangeError::ColumnCountMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert_eq!(err.class(), ErrorClass::Protocol);
    assert_eq!(summary.batches_sent, 1);
    assert!(sink.batches().is_empty());
    assert!(sink.is_finished());
    assert_eq!(source.remaining(), 1);
}

#[tokio::test]
async fn test_worker_death_keeps_earlier_batches() {
    for format in [WireFormat::Text, WireFormat::Binary] {
        let rows = mixed_rows(10);
        let mut source = MemorySource::from_rows(mixed_schema(), rows.clone(), 2).unwrap();
        let command = WorkerCommand::new(env!("CARGO_BIN_EXE_rowpipe-echo"))
            .args([format.name(), "die-after", "2"]);
        let (summary, sink) =
            run(command, format, mixed_schema(), mixed_schema(), &mut source).await;

        let err = summary.error.as_ref().expect("exchange should abort");
        assert!(err.is_worker_exited(), "{}: {:?}", format, err);
        assert_eq!(err.class(), ErrorClass::Io);
        assert_eq!(sink.batches().len(), 2, "{}", format);
        assert_eq!(sink.rows(), rows[..4].to_vec());
        assert_eq!(summary.rows_received, 4);
    }
}

#[tokio::test]
async fn test_garbage_reply_is_a_protocol_error() {
    for format in [WireFormat::Text, WireFormat::Binary] {
        let rows = mixed_rows(3);
        let mut source = MemorySource::from_rows(mixed_schema(), rows, 3).unwrap();
        let (summary, sink) = run(
            echo_worker(format.name(), "garbage"),
            format,
            mixed_schema(),
            mixed_schema(),
            &mut source,
        )
        .await;

        assert!(
            matches!(summary.error, Some(ExchangeError::MalformedHeader(_))),
            "{}: {:?}",
            format,
            summary.error
        );
        assert!(sink.batches().is_empty());
    }
}

#[tokio::test]
async fn test_spawn_failure() {
    let err = Exchange::spawn(
        &WorkerCommand::new("/nonexistent/rowpipe-worker"),
        mixed_schema(),
        mixed_schema(),
        TextCodec::default(),
        ChannelOptions::new(WireFormat::Text),
    )
    .await
    .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Spawn);
}

#[cfg(unix)]
#[tokio::test]
async fn test_silent_worker_times_out() {
    let mut options = ChannelOptions::new(WireFormat::Text);
    options.receive_timeout = Some(Duration::from_millis(100));
    let command = WorkerCommand::new("/bin/sh")
        .args(["-c", "sleep 5"])
        .with_shutdown_grace(Duration::from_millis(50));
    let exchange = Exchange::spawn(
        &command,
        mixed_schema(),
        mixed_schema(),
        TextCodec::default(),
        options,
    )
    .await
    .unwrap();

    let mut source = MemorySource::from_rows(mixed_schema(), mixed_rows(2), 2).unwrap();
    let mut sink = MemorySink::new();
    let summary = exchange.run(&mut source, &mut sink).await.unwrap();
    assert!(matches!(summary.error, Some(ExchangeError::Timeout(_))));
    assert!(sink.batches().is_empty());
}
