// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Drive a `Session` with frames exactly as they arrive on the wire, in both
//! wire formats.

use rill_core::{
    decode, encode, FlushOutcome, Role, Segment, ServerMessage, Session, SessionEvent, WireFormat,
    ERROR_NOTICE,
};

fn frames(format: WireFormat, msgs: &[ServerMessage]) -> Vec<String> {
    msgs.iter().map(|m| encode(format, m).unwrap()).collect()
}

fn run(format: WireFormat, prompt: &str, wire: &[String]) -> (Session, Vec<SessionEvent>) {
    let mut session = Session::new();
    session.begin(prompt).unwrap();
    let mut events = Vec::new();
    for frame in wire {
        let msg = decode(format, frame).unwrap();
        events.push(session.handle(msg).unwrap());
    }
    (session, events)
}

fn bot_segments(session: &Session) -> Vec<Segment> {
    session
        .log()
        .entries()
        .iter()
        .filter(|e| e.role == Role::Bot)
        .map(|e| e.segment.clone())
        .collect()
}

#[test]
fn code_answer_round_trips_in_both_formats() {
    let msgs = [
        ServerMessage::chunk("Sure, here's code:\n```py"),
        ServerMessage::chunk("thon\nprint(1)\n```\nDone."),
        ServerMessage::End,
    ];
    for format in [WireFormat::Envelope, WireFormat::Sentinel] {
        let (session, events) = run(format, "hello", &frames(format, &msgs));
        assert_eq!(events.last(), Some(&SessionEvent::Completed(FlushOutcome::Clean)));
        assert_eq!(
            bot_segments(&session),
            vec![
                Segment::text("Sure, here's code:"),
                Segment::code("python", "print(1)"),
                Segment::text("Done."),
            ],
            "{format:?}"
        );
        assert_eq!(session.log().entries()[0].segment, Segment::text("hello"));
    }
}

#[test]
fn error_after_two_fragments_keeps_rendered_output() {
    let msgs = [
        ServerMessage::chunk("Step one.\n```sh\nls\n```\n"),
        ServerMessage::chunk("Step two"),
        ServerMessage::error("upstream generation failed"),
    ];
    let (session, events) = run(WireFormat::Sentinel, "steps", &frames(WireFormat::Sentinel, &msgs));

    // Sentinel ERROR carries no detail, so the plain notice is shown.
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Failed { message: ERROR_NOTICE.to_string() })
    );
    assert_eq!(
        bot_segments(&session),
        vec![
            Segment::text("Step one."),
            Segment::code("sh", "ls"),
            Segment::text("Step two"),
        ]
    );
    let last = session.log().entries().last().unwrap();
    assert_eq!(last.role, Role::AppError);
    assert!(!session.is_busy());
}

#[test]
fn envelope_chunk_equal_to_marker_is_text() {
    let msgs = [ServerMessage::chunk("END"), ServerMessage::End];
    let (session, _) = run(WireFormat::Envelope, "say END", &frames(WireFormat::Envelope, &msgs));
    assert_eq!(bot_segments(&session), vec![Segment::text("END")]);
}
