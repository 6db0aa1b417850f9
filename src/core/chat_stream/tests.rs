use super::decoder::SseLineBuffer;
use super::*;
use crate::core::providers::ProtocolFamily;
use futures_util::stream;

const FAMILY_A_TRANSCRIPT: &str = concat!(
    "event: message_start\n",
    "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n",
    "\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"Überlege… \"}}\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"signature_delta\",\"signature\":\"abc\"}}\n",
    "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
    "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n",
    "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"Grüße 👋\"}}\n",
    "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"stray\"}}\n",
    "data: {\"type\":\"content_block_stop\",\"index\":1}\n",
    "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":15}}\n",
    "data: {\"type\":\"message_stop\"}\n",
);

fn decode_all(family: ProtocolFamily, chunks: &[&[u8]]) -> Vec<StreamEvent> {
    let mut normalizer = StreamNormalizer::new(family);
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(normalizer.push(chunk));
    }
    events.extend(normalizer.finish());
    events
}

fn usage(input: Option<u64>, output: Option<u64>) -> Usage {
    Usage {
        input_tokens: input,
        output_tokens: output,
        ..Usage::default()
    }
}

#[test]
fn family_b_end_to_end() {
    let chunks: [&[u8]; 4] = [
        b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
        b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
        b"data: [DONE]\n",
        b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":2}}\n",
    ];
    assert_eq!(
        decode_all(ProtocolFamily::ChatCompletions, &chunks),
        vec![
            StreamEvent::TextDelta("Hel".into()),
            StreamEvent::TextDelta("lo".into()),
            StreamEvent::UsageUpdate(usage(Some(10), Some(2))),
            StreamEvent::Done,
        ]
    );
}

#[test]
fn family_a_attributes_thinking_and_text() {
    let events = decode_all(ProtocolFamily::Messages, &[FAMILY_A_TRANSCRIPT.as_bytes()]);
    assert_eq!(
        events,
        vec![
            StreamEvent::UsageUpdate(usage(Some(25), Some(1))),
            StreamEvent::ThinkingDelta("Überlege… ".into()),
            StreamEvent::TextDelta("Grüße 👋".into()),
            StreamEvent::UsageUpdate(usage(None, Some(15))),
            StreamEvent::Done,
        ]
    );
}

#[test]
fn any_two_way_split_yields_identical_events() {
    let bytes = FAMILY_A_TRANSCRIPT.as_bytes();
    let expected = decode_all(ProtocolFamily::Messages, &[bytes]);
    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        assert_eq!(
            decode_all(ProtocolFamily::Messages, &[head, tail]),
            expected,
            "split at byte {split}"
        );
    }
}

#[test]
fn byte_at_a_time_matches_whole_feed() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm… \"}}]}\r\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Ça va? 日本\"}}]}\r\n",
        "data:[DONE]\r\n",
    )
    .as_bytes();
    let whole = decode_all(ProtocolFamily::ChatCompletions, &[body]);
    let singles: Vec<&[u8]> = body.chunks(1).collect();
    assert_eq!(decode_all(ProtocolFamily::ChatCompletions, &singles), whole);
    assert_eq!(
        whole,
        vec![
            StreamEvent::ThinkingDelta("hmm… ".into()),
            StreamEvent::TextDelta("Ça va? 日本".into()),
            StreamEvent::Done,
        ]
    );
}

#[test]
fn line_buffer_keeps_incomplete_tail() {
    let mut buffer = SseLineBuffer::default();
    assert_eq!(buffer.push(b"data: a\r\ndata: b"), vec!["data: a".to_string()]);
    assert_eq!(buffer.pending_len(), 7);
    assert_eq!(buffer.push(b"\n"), vec!["data: b".to_string()]);
    assert_eq!(buffer.pending_len(), 0);
}

#[test]
fn malformed_and_foreign_lines_are_skipped() {
    let chunks: [&[u8]; 5] = [
        b": keep-alive comment\n",
        b"id: 7\n",
        b"data: {not json\n",
        b"data: {\"choices\":[{\"delta\":{\"reasoning\":\"r\",\"content\":\"ok\"}}]}\n",
        b"data: {\"choices\":[{\"delta\":{\"content\":\"unterminated\"}}]}",
    ];
    assert_eq!(
        decode_all(ProtocolFamily::ChatCompletions, &chunks),
        vec![
            StreamEvent::ThinkingDelta("r".into()),
            StreamEvent::TextDelta("ok".into()),
            StreamEvent::Done,
        ]
    );
}

#[test]
fn in_band_errors_surface_for_both_families() {
    let family_b: [&[u8]; 1] = [b"data: {\"error\":{\"message\":\"rate limited\",\"code\":429}}\n"];
    assert_eq!(
        decode_all(ProtocolFamily::ChatCompletions, &family_b),
        vec![StreamEvent::Error("rate limited".into()), StreamEvent::Done]
    );

    let family_a: [&[u8]; 1] = [
        b"event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n",
    ];
    assert_eq!(
        decode_all(ProtocolFamily::Messages, &family_a),
        vec![StreamEvent::Error("Overloaded".into()), StreamEvent::Done]
    );
}

#[test]
fn cached_tokens_map_to_cache_reads() {
    let chunks: [&[u8]; 1] = [
        b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":50,\"completion_tokens\":5,\"prompt_tokens_details\":{\"cached_tokens\":40}}}\n",
    ];
    let events = decode_all(ProtocolFamily::ChatCompletions, &chunks);
    assert_eq!(
        events[0],
        StreamEvent::UsageUpdate(Usage {
            input_tokens: Some(50),
            output_tokens: Some(5),
            cache_read_input_tokens: Some(40),
            cache_creation_input_tokens: None,
        })
    );
}

#[test]
fn done_is_emitted_once() {
    let mut normalizer = StreamNormalizer::new(ProtocolFamily::ChatCompletions);
    assert!(normalizer.push(b"data: [DONE]\n").is_empty());
    assert_eq!(normalizer.finish(), vec![StreamEvent::Done]);
    assert!(normalizer.is_finished());
    assert!(normalizer.finish().is_empty());
    assert!(normalizer
        .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n")
        .is_empty());
}

#[test]
fn oversized_line_ends_stream_with_error() {
    let mut normalizer = StreamNormalizer::with_line_limit(ProtocolFamily::ChatCompletions, 16);
    let events = normalizer.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n");
    assert_eq!(events, vec![StreamEvent::TextDelta("ok".into())]);

    let events = normalizer.push(&[b'x'; 17]);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], StreamEvent::Error(message) if message.contains("16 bytes")));
    assert_eq!(events[1], StreamEvent::Done);
    assert!(normalizer.is_finished());
    assert!(normalizer.finish().is_empty());
}

#[test]
fn line_at_the_limit_is_still_buffered() {
    let mut normalizer = StreamNormalizer::with_line_limit(ProtocolFamily::ChatCompletions, 64);
    let line = b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}";
    assert!(line.len() <= 64);
    assert!(normalizer.push(line).is_empty());
    assert!(!normalizer.is_finished());
    assert_eq!(normalizer.push(b"\n"), vec![StreamEvent::TextDelta("hi".into())]);
}

#[tokio::test]
async fn pump_stream_stops_reading_after_oversized_line() {
    static LONG_LINE: [u8; 40] = [b'x'; 40];
    let chunks: Vec<Result<&[u8], String>> = vec![
        Ok(LONG_LINE.as_slice()),
        Ok(b"\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n".as_slice()),
    ];
    let token = CancellationToken::new();
    let mut events = Vec::new();
    let end = pump_stream(
        stream::iter(chunks),
        StreamNormalizer::with_line_limit(ProtocolFamily::ChatCompletions, 32),
        &token,
        |event| events.push(event),
    )
    .await;

    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamEvent::Error(_)));
    assert_eq!(events[1], StreamEvent::Done);
}

#[tokio::test]
async fn pump_stream_delivers_events_in_order() {
    let chunks: Vec<Result<&[u8], String>> = vec![
        Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"He".as_slice()),
        Ok(b"l\"}}]}\ndata: [DONE]\n".as_slice()),
    ];
    let token = CancellationToken::new();
    let mut events = Vec::new();
    let end = pump_stream(
        stream::iter(chunks),
        StreamNormalizer::new(ProtocolFamily::ChatCompletions),
        &token,
        |event| events.push(event),
    )
    .await;

    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(
        events,
        vec![StreamEvent::TextDelta("Hel".into()), StreamEvent::Done]
    );
}

#[tokio::test]
async fn pump_stream_stops_when_cancelled() {
    let first: Vec<Result<&[u8], String>> =
        vec![Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n".as_slice())];
    let body = stream::iter(first).chain(stream::pending());
    let token = CancellationToken::new();
    let cancel = token.clone();
    let mut events = Vec::new();

    let end = pump_stream(
        body,
        StreamNormalizer::new(ProtocolFamily::ChatCompletions),
        &token,
        |event| {
            events.push(event);
            cancel.cancel();
        },
    )
    .await;

    assert_eq!(end, StreamEnd::Cancelled);
    assert_eq!(events, vec![StreamEvent::TextDelta("Hel".into())]);
}

#[tokio::test]
async fn pump_stream_reports_transport_errors() {
    let chunks: Vec<Result<&[u8], String>> = vec![
        Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n".as_slice()),
        Err("connection reset".to_string()),
    ];
    let token = CancellationToken::new();
    let mut accumulator = StreamAccumulator::new();
    pump_stream(
        stream::iter(chunks),
        StreamNormalizer::new(ProtocolFamily::ChatCompletions),
        &token,
        |event| accumulator.apply(&event),
    )
    .await;

    assert!(accumulator.is_done());
    assert_eq!(
        accumulator.final_content(false),
        "partial\n\nError: connection reset"
    );
}

#[test]
fn accumulator_final_content_cases() {
    let mut stopped = StreamAccumulator::new();
    assert_eq!(stopped.final_content(true), STOPPED_TEXT);
    stopped.apply(&StreamEvent::TextDelta("half an ans".into()));
    assert_eq!(stopped.final_content(true), "half an ans");

    let mut thought = StreamAccumulator::new();
    thought.apply(&StreamEvent::ThinkingDelta("plan".into()));
    thought.apply(&StreamEvent::TextDelta("answer".into()));
    thought.apply(&StreamEvent::UsageUpdate(usage(Some(3), None)));
    thought.apply(&StreamEvent::UsageUpdate(usage(None, Some(4))));
    assert_eq!(
        thought.final_content(false),
        "<thinking>\nplan\n</thinking>\n\nanswer"
    );
    assert_eq!(thought.usage, Some(usage(Some(3), Some(4))));

    let mut failed = StreamAccumulator::new();
    failed.apply(&StreamEvent::Error("API Error: boom".into()));
    assert_eq!(failed.final_content(false), "Error: API Error: boom");
}

#[test]
fn service_tags_events_with_stream_id() {
    let (service, mut rx) = ChatStreamService::new();
    service.send_for_test(StreamEvent::TextDelta("x".into()), 7);
    service.send_for_test(StreamEvent::Done, 7);

    let (event, id) = rx.try_recv().expect("expected delta");
    assert_eq!((event, id), (StreamEvent::TextDelta("x".into()), 7));
    let (event, id) = rx.try_recv().expect("expected done");
    assert_eq!((event, id), (StreamEvent::Done, 7));
    assert!(rx.try_recv().is_err());
}

#[test]
fn format_api_error_prettifies_json_with_summary() {
    let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
    let formatted = format_api_error(raw);

    let expected = r#"API Error: model overloaded
```json
{
  "error": {
    "message": "model overloaded",
    "type": "invalid_request_error"
  }
}
```"#;
    assert_eq!(formatted, expected);
}

#[test]
fn format_api_error_handles_json_without_summary() {
    let raw = r#"{"status":"failed"}"#;
    let formatted = format_api_error(raw);

    let expected = r#"API Error:
```json
{
  "status": "failed"
}
```"#;
    assert_eq!(formatted, expected);
}

#[test]
fn format_api_error_handles_xml_and_plaintext() {
    assert_eq!(
        format_api_error("<error>bad</error>"),
        "API Error:\n```xml\n<error>bad</error>\n```"
    );
    assert_eq!(format_api_error("api failure"), "API Error:\n```\napi failure\n```");
    assert_eq!(format_api_error("  "), "API Error:\n```\n<empty>\n```");
}
