//! Wire framing of the chat event stream.
//!
//! Every event is a single `data: <json>` line followed by a blank line. The JSON uses
//! `", "` between members and `": "` between keys and values, which is the format
//! existing clients of this endpoint were written against.

use std::{convert::Infallible, io};

use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

use crate::messages::StreamEvent;

const SERIALIZATION_FAILURE: &str = r#"{"error": "Failed to serialize response"}"#;

/// Renders an event as a complete SSE frame.
pub fn frame(event: &StreamEvent) -> String {
    format!("data: {}\n\n", to_json(event))
}

/// Renders the JSON payload of an event.
pub fn to_json(event: &StreamEvent) -> String {
    let mut buffer = Vec::with_capacity(64);
    let mut serializer = Serializer::with_formatter(&mut buffer, SpacedFormatter);

    if let Err(e) = event.serialize(&mut serializer) {
        log::error!("Failed to serialize stream event: {e}");
        return SERIALIZATION_FAILURE.to_string();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        log::error!("Serialized stream event is not valid UTF-8: {e}");
        SERIALIZATION_FAILURE.to_string()
    })
}

/// Turns the dispatcher output into an axum SSE response.
///
/// No keep-alive comments are sent; the stream ends when the connection closes.
pub(crate) fn into_response<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    Sse::new(events.map(|event| Ok(Event::default().data(to_json(&event)))))
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
