use arrow::array::Array;
use rowpipe::codec::TextCodec;
use rowpipe::types::{DataType, Field, RowBatch, Schema, Value};
use rowpipe::wire::frame::{batch_payload, empty_payload, parse_payload};
use rowpipe::wire::{BatchDecoder, BatchEncoder, Frame, Reply, WireFormat};
use rowpipe::{ErrorClass, ExchangeError};

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("score", DataType::Float64),
        Field::new("ratio", DataType::Float32),
        Field::new("label", DataType::Utf8),
        Field::new("blob", DataType::Binary),
        Field::new("ok", DataType::Bool),
        Field::new("small", DataType::UInt8),
        Field::new("signed", DataType::Int8),
    ])
}

fn batch() -> RowBatch {
    let rows = (0..20)
        .map(|i| {
            if i % 3 == 0 {
                vec![Value::Null; 8]
            } else {
                vec![
                    Value::Int64(i * 1_000_000_007),
                    Value::Float64(i as f64 / 7.0),
                    Value::Float32(i as f32 * 0.5),
                    Value::from(format!("label-{}-é", i)),
                    Value::Binary(vec![i as u8; i as usize % 4]),
                    Value::Bool(i % 2 == 0),
                    Value::UInt8(200 + i as u8),
                    Value::Int8(-(i as i8)),
                ]
            }
        })
        .collect();
    RowBatch::from_rows(&schema(), rows).unwrap()
}

fn codec() -> (BatchEncoder, BatchDecoder) {
    (
        BatchEncoder::new(WireFormat::Binary, schema(), TextCodec::default()).unwrap(),
        BatchDecoder::new(WireFormat::Binary, schema(), TextCodec::default()).unwrap(),
    )
}

#[test]
fn test_round_trip_all_types() {
    let (encoder, decoder) = codec();
    let batch = batch();
    let frame = encoder.encode(&batch).unwrap();
    assert!(matches!(frame, Frame::Binary { .. }));
    assert_eq!(decoder.decode(&frame).unwrap(), Reply::Batch(batch));
}

#[test]
fn test_null_bitmaps_on_the_wire() {
    let (encoder, _) = codec();
    let Frame::Binary { payload } = encoder.encode(&batch()).unwrap() else {
        panic!("expected a binary frame");
    };
    let parsed = parse_payload(&payload).unwrap();
    assert_eq!(parsed.num_rows(), 20);
    assert_eq!(parsed.num_columns(), 8);
    for array in parsed.batches[0].columns() {
        let nulls = array.nulls().expect("every column has nulls");
        assert_eq!(nulls.null_count(), 7);
        // Rows 0, 3, 6, ... are null; bits are least significant first.
        assert_eq!(
            &nulls.validity()[..3],
            &[0b1011_0110, 0b0110_1101, 0b0000_1011]
        );
    }
}

#[test]
fn test_arrow_field_types() {
    let (encoder, _) = codec();
    let Frame::Binary { payload } = encoder.encode(&batch()).unwrap() else {
        panic!("expected a binary frame");
    };
    let parsed = parse_payload(&payload).unwrap();
    let types: Vec<String> = parsed
        .schema
        .fields()
        .iter()
        .map(|f| format!("{}:{}", f.name(), f.data_type()))
        .collect();
    insta::assert_snapshot!(types.join(" "), @"id:Int64 score:Float64 ratio:Float32 label:Utf8 blob:Binary ok:Boolean small:UInt8 signed:Int8");
}

#[test]
fn test_reply_names_follow_declared_schema() {
    let (encoder, _) = codec();
    let declared = Schema::new(
        schema()
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| Field::new(format!("out{}", i), f.data_type.clone()))
            .collect(),
    );
    let decoder = BatchDecoder::new(WireFormat::Binary, declared, TextCodec::default()).unwrap();
    let Reply::Batch(decoded) = decoder.decode(&encoder.encode(&batch()).unwrap()).unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(decoded.columns()[3].name(), "out3");
    assert_eq!(decoded.rows().collect::<Vec<_>>(), batch().rows().collect::<Vec<_>>());
}

#[test]
fn test_zero_columns_is_not_end_of_stream() {
    let (_, decoder) = codec();
    let reply = decoder
        .decode(&Frame::Binary {
            payload: empty_payload().unwrap(),
        })
        .unwrap();
    assert_eq!(reply, Reply::Empty);
    assert_eq!(decoder.decode(&Frame::End).unwrap(), Reply::EndOfStream);
}

#[test]
fn test_column_count_mismatch_never_partially_decodes() {
    let decoder = BatchDecoder::new(
        WireFormat::Binary,
        Schema::from_types(&[DataType::Int64, DataType::Int64, DataType::Int64]),
        TextCodec::default(),
    )
    .unwrap();
    let reply = RowBatch::from_rows(
        &Schema::from_types(&[DataType::Int64, DataType::Int64]),
        vec![vec![Value::Int64(5), Value::Int64(5)]],
    )
    .unwrap();
    let payload = batch_payload(&reply).unwrap();
    let err = decoder.decode(&Frame::Binary { payload }).unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::ColumnCountMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert_eq!(err.class(), ErrorClass::Protocol);
}

#[test]
fn test_truncated_payload_rejected() {
    let decoder = BatchDecoder::new(
        WireFormat::Binary,
        Schema::from_types(&[DataType::Int64]),
        TextCodec::default(),
    )
    .unwrap();
    let reply = RowBatch::from_rows(
        &Schema::from_types(&[DataType::Int64]),
        vec![vec![Value::Int64(5)], vec![Value::Int64(6)]],
    )
    .unwrap();
    let mut payload = batch_payload(&reply).unwrap();
    payload.truncate(payload.len() - 12);
    let err = decoder.decode(&Frame::Binary { payload }).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Protocol);
}

#[test]
fn test_out_of_range_string_offsets_rejected() {
    let decoder = BatchDecoder::new(
        WireFormat::Binary,
        Schema::from_types(&[DataType::Utf8]),
        TextCodec::default(),
    )
    .unwrap();
    let reply = RowBatch::from_rows(
        &Schema::from_types(&[DataType::Utf8]),
        vec![vec![Value::from("aaaa")], vec![Value::from("bbbb")]],
    )
    .unwrap();
    let mut payload = batch_payload(&reply).unwrap();

    // Offsets [0, 4, 8] sit in the record batch body, after all metadata.
    let at = payload
        .windows(8)
        .rposition(|w| w == [4, 0, 0, 0, 8, 0, 0, 0])
        .expect("offsets buffer in payload");
    payload[at + 4] = 0x7f;

    let err = decoder.decode(&Frame::Binary { payload }).unwrap_err();
    assert!(
        matches!(err, ExchangeError::CorruptPayload(_)),
        "{:?}",
        err
    );
    assert_eq!(err.class(), ErrorClass::Protocol);
}

#[test]
fn test_garbage_payload_is_a_malformed_header() {
    let (_, decoder) = codec();
    let err = decoder
        .decode(&Frame::Binary {
            payload: b"junk!".to_vec(),
        })
        .unwrap_err();
    assert!(matches!(err, ExchangeError::MalformedHeader(_)));
}

#[test]
fn test_unsupported_type_is_an_error() {
    let schema = Schema::from_types(&[DataType::Other("geometry".into())]);
    let err = BatchEncoder::new(WireFormat::Binary, schema, TextCodec::default()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::UnsupportedType);
    assert_eq!(
        err.to_string(),
        "type geometry is not supported by the binary format"
    );
}
