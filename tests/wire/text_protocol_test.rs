use insta::assert_snapshot;
use rowpipe::codec::{Stringifiers, TextCodec, TextOptions};
use rowpipe::types::{DataType, Field, OtherValue, RowBatch, Schema, Value};
use rowpipe::wire::{BatchDecoder, BatchEncoder, Frame, Reply, WireFormat};
use rowpipe::ExchangeError;

fn wire_text(frame: &Frame) -> String {
    match frame {
        Frame::Text { row_count, body } => {
            format!("{}\n{}", row_count, String::from_utf8_lossy(body))
        }
        other => panic!("expected a text frame, got {:?}", other),
    }
}

fn all_types_schema() -> Schema {
    Schema::new(vec![
        Field::new("i", DataType::Int64),
        Field::new("d", DataType::Float64),
        Field::new("f", DataType::Float32),
        Field::new("s", DataType::Utf8),
        Field::new("b", DataType::Binary),
        Field::new("flag", DataType::Bool),
        Field::new("u", DataType::UInt8),
        Field::new("t", DataType::Int8),
    ])
}

fn all_types_batch() -> RowBatch {
    RowBatch::from_rows(
        &all_types_schema(),
        vec![
            vec![
                Value::Int64(i64::MIN),
                Value::Float64(-0.125),
                Value::Float32(3.5),
                Value::from("tab\there, quote ' and \\ slash"),
                Value::Binary(vec![0xde, 0xad, 0xbe, 0xef]),
                Value::Bool(true),
                Value::UInt8(0),
                Value::Int8(-128),
            ],
            vec![
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ],
            vec![
                Value::Int64(7),
                Value::Float64(1e300),
                Value::Float32(-0.0),
                Value::from(""),
                Value::Binary(vec![]),
                Value::Bool(false),
                Value::UInt8(255),
                Value::Int8(127),
            ],
        ],
    )
    .unwrap()
}

#[test]
fn test_scenario_request_lines() {
    let schema = Schema::new(vec![
        Field::new("a", DataType::Int64),
        Field::new("b", DataType::Utf8),
    ]);
    let batch = RowBatch::from_rows(
        &schema,
        vec![
            vec![Value::Int64(1), Value::from("x")],
            vec![Value::Null, Value::from("y")],
        ],
    )
    .unwrap();
    let encoder = BatchEncoder::new(WireFormat::Text, schema, TextCodec::default()).unwrap();
    let frame = encoder.encode(&batch).unwrap();

    assert_snapshot!(format!("{:?}", wire_text(&frame)), @r#""2\n1\t'x'\nnull\t'y'\n""#);
}

#[test]
fn test_scenario_reply_lines() {
    let decoder = BatchDecoder::new(
        WireFormat::Text,
        Schema::from_types(&[DataType::Utf8]),
        TextCodec::default(),
    )
    .unwrap();

    let reply = decoder.decode_text_message(b"1\nHello\\tx\n").unwrap();
    let Reply::Batch(batch) = reply else {
        panic!("expected rows, got {:?}", reply);
    };
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(batch.columns()[0].name(), "a0");
    assert_eq!(batch.row(0), vec![Value::from("Hello\\tx")]);

    let quoted = decoder.decode_text_message(b"1\n'Hello\\'s\\\\x'\n").unwrap();
    let Reply::Batch(batch) = quoted else {
        panic!("expected rows");
    };
    assert_eq!(batch.row(0), vec![Value::from("Hello's\\x")]);
}

#[test]
fn test_all_types_wire_text() {
    let encoder =
        BatchEncoder::new(WireFormat::Text, all_types_schema(), TextCodec::default()).unwrap();
    let frame = encoder.encode(&all_types_batch()).unwrap();

    assert_snapshot!(
        format!("{:?}", wire_text(&frame)),
        @r#""3\n-9223372036854775808\t-0.125\t3.5\t'tab\there, quote \\' and \\\\ slash'\tdeadbeef\ttrue\t0\t-128\nnull\tnull\tnull\tnull\tnull\tnull\tnull\tnull\n7\t1e300\t-0.0\t''\t\tfalse\t255\t127\n""#
    );
}

#[test]
fn test_round_trip_all_types() {
    let schema = all_types_schema();
    let encoder = BatchEncoder::new(WireFormat::Text, schema.clone(), TextCodec::default()).unwrap();
    let decoder = BatchDecoder::new(WireFormat::Text, schema, TextCodec::default()).unwrap();

    let batch = all_types_batch();
    let frame = encoder.encode(&batch).unwrap();
    assert_eq!(decoder.decode(&frame).unwrap(), Reply::Batch(batch));
}

#[test]
fn test_tab_inside_string_round_trips() {
    let schema = Schema::new(vec![
        Field::new("s", DataType::Utf8),
        Field::new("n", DataType::Int64),
    ]);
    let batch = RowBatch::from_rows(
        &schema,
        vec![
            vec![Value::from("left\tright"), Value::Int64(1)],
            vec![Value::from("\t'\t"), Value::Int64(2)],
        ],
    )
    .unwrap();
    let encoder = BatchEncoder::new(WireFormat::Text, schema.clone(), TextCodec::default()).unwrap();
    let decoder = BatchDecoder::new(WireFormat::Text, schema, TextCodec::default()).unwrap();

    let frame = encoder.encode(&batch).unwrap();
    assert_snapshot!(
        format!("{:?}", wire_text(&frame)),
        @r#""2\n'left\tright'\t1\n'\t\\'\t'\t2\n""#
    );
    assert_eq!(decoder.decode(&frame).unwrap(), Reply::Batch(batch));
}

#[test]
fn test_newline_inside_string_is_rejected() {
    let schema = Schema::from_types(&[DataType::Utf8]);
    let encoder = BatchEncoder::new(WireFormat::Text, schema.clone(), TextCodec::default()).unwrap();
    let batch = RowBatch::from_rows(&schema, vec![vec![Value::from("one\ntwo")]]).unwrap();
    let err = encoder.encode(&batch).unwrap_err();
    assert_eq!(err.class(), rowpipe::ErrorClass::Format);
    assert_snapshot!(
        err.to_string(),
        @r#"row 0, column 0: invalid string cell "one\ntwo": contains the delimiter '\n'"#
    );
}

#[test]
fn test_null_preservation() {
    let schema = Schema::new(vec![
        Field::new("n", DataType::Int64),
        Field::new("s", DataType::Utf8),
    ]);
    let rows: Vec<Vec<Value>> = (0..10)
        .map(|i| {
            if i % 2 == 0 {
                vec![Value::Int64(i), Value::Null]
            } else {
                vec![Value::Int64(i), Value::from(format!("row {}", i))]
            }
        })
        .collect();
    let batch = RowBatch::from_rows(&schema, rows).unwrap();

    let encoder = BatchEncoder::new(WireFormat::Text, schema.clone(), TextCodec::default()).unwrap();
    let decoder = BatchDecoder::new(WireFormat::Text, schema, TextCodec::default()).unwrap();
    let Reply::Batch(decoded) = decoder.decode(&encoder.encode(&batch).unwrap()).unwrap() else {
        panic!("expected rows");
    };

    let strings = &decoded.columns()[1];
    let nulls: Vec<usize> = (0..decoded.num_rows()).filter(|&i| strings.is_null(i)).collect();
    assert_eq!(nulls, vec![0, 2, 4, 6, 8]);
    assert_eq!(decoded.columns()[0].null_count(), 0);
}

#[test]
fn test_quoted_null_token_is_a_string() {
    let decoder = BatchDecoder::new(
        WireFormat::Text,
        Schema::from_types(&[DataType::Utf8, DataType::Utf8]),
        TextCodec::default(),
    )
    .unwrap();
    let Reply::Batch(batch) = decoder.decode_text_message(b"1\nnull\t'null'\n").unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(batch.row(0), vec![Value::Null, Value::from("null")]);
}

#[test]
fn test_zero_row_reply_is_empty() {
    let decoder = BatchDecoder::new(
        WireFormat::Text,
        Schema::from_types(&[DataType::Int64]),
        TextCodec::default(),
    )
    .unwrap();
    assert_eq!(decoder.decode_text_message(b"0\n").unwrap(), Reply::Empty);
}

#[test]
fn test_malformed_headers() {
    let decoder = BatchDecoder::new(
        WireFormat::Text,
        Schema::from_types(&[DataType::Int64]),
        TextCodec::default(),
    )
    .unwrap();
    for message in [&b"-1\n"[..], b"two\n1\n2\n", b"1 \n5\n", b"\n"] {
        let err = decoder.decode_text_message(message).unwrap_err();
        assert!(
            matches!(err, ExchangeError::MalformedHeader(_)),
            "{:?} gave {:?}",
            String::from_utf8_lossy(message),
            err
        );
    }
}

#[test]
fn test_format_error_names_the_cell() {
    let decoder = BatchDecoder::new(
        WireFormat::Text,
        Schema::from_types(&[DataType::Int64, DataType::Bool]),
        TextCodec::default(),
    )
    .unwrap();
    let err = decoder
        .decode_text_message(b"2\n1\ttrue\n2\tmaybe\n")
        .unwrap_err();
    assert_eq!(err.class(), rowpipe::ErrorClass::Format);
    assert_snapshot!(
        err.to_string(),
        @r#"row 1, column 1: invalid bool cell "maybe": expected true or false"#
    );
}

#[test]
fn test_stringified_other_type() {
    let schema = Schema::new(vec![Field::new("p", DataType::Other("point".into()))]);
    let codec = TextCodec::new(
        TextOptions::default(),
        Stringifiers::new().with("point", |v| {
            format!("({},{})", v.bytes[0], v.bytes[1])
        }),
    );
    let encoder = BatchEncoder::new(WireFormat::Text, schema.clone(), codec).unwrap();
    let batch = RowBatch::from_rows(
        &schema,
        vec![
            vec![Value::Other(OtherValue::new("point", vec![3, 4]))],
            vec![Value::Null],
        ],
    )
    .unwrap();
    let frame = encoder.encode(&batch).unwrap();
    assert_snapshot!(format!("{:?}", wire_text(&frame)), @r#""2\n(3,4)\nnull\n""#);
}

#[test]
fn test_stringifier_output_must_not_split_the_row() {
    let schema = Schema::new(vec![
        Field::new("p", DataType::Other("point".into())),
        Field::new("n", DataType::Int64),
    ]);
    let codec = TextCodec::new(
        TextOptions::default(),
        Stringifiers::new().with("point", |v| format!("{}\t{}", v.bytes[0], v.bytes[1])),
    );
    let encoder = BatchEncoder::new(WireFormat::Text, schema.clone(), codec).unwrap();
    let batch = RowBatch::from_rows(
        &schema,
        vec![vec![
            Value::Other(OtherValue::new("point", vec![3, 4])),
            Value::Int64(1),
        ]],
    )
    .unwrap();
    let err = encoder.encode(&batch).unwrap_err();
    assert!(
        matches!(
            err,
            ExchangeError::InvalidCell {
                row: 0,
                column: 0,
                ..
            }
        ),
        "{:?}",
        err
    );
}
