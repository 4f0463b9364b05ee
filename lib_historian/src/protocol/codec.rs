//! # Envelope Codec
//!
//! Turns a [`Frame`] into the bytes of one binary WebSocket message and back.
//! The engine only depends on the [`EnvelopeCodec`] trait; [`ProstCodec`] is
//! the implementation for the protobuf schema in [`super::envelope`].

use prost::Message;

use super::envelope::*;
use crate::core::registry::RequestId;
use crate::error::{HistorianError, Result};

/// A decoded message of any kind, with its body.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    TimeProbeRequest,
    TimeProbeResponse(TimeProbeReply),
    DirectoryRequest,
    DirectoryResponse(DirectoryReply),
    TimeRangeRequest,
    TimeRangeResponse(TimeRangeReply),
    VersionRequest,
    VersionResponse(VersionReply),
    TimeseriesRequest(TimeseriesRequestBody),
    TimeseriesResponse(TimeseriesReply),
    EventQueryRequest(EventFilter),
    EventQueryResponse(EventQueryReply),
    EventCountRequest(EventFilter),
    EventCountResponse(EventCountReply),
    Error(ErrorReply),
    SenderTagRequest(SenderTagRequestBody),
    SenderTagResponse(SenderTagReply),
}

impl WireMessage {
    /// The envelope kind this message travels under.
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::TimeProbeRequest => MessageKind::TimeProbeRequest,
            WireMessage::TimeProbeResponse(_) => MessageKind::TimeProbeResponse,
            WireMessage::DirectoryRequest => MessageKind::DirectoryRequest,
            WireMessage::DirectoryResponse(_) => MessageKind::DirectoryResponse,
            WireMessage::TimeRangeRequest => MessageKind::TimeRangeRequest,
            WireMessage::TimeRangeResponse(_) => MessageKind::TimeRangeResponse,
            WireMessage::VersionRequest => MessageKind::VersionRequest,
            WireMessage::VersionResponse(_) => MessageKind::VersionResponse,
            WireMessage::TimeseriesRequest(_) => MessageKind::TimeseriesRequest,
            WireMessage::TimeseriesResponse(_) => MessageKind::TimeseriesResponse,
            WireMessage::EventQueryRequest(_) => MessageKind::EventQueryRequest,
            WireMessage::EventQueryResponse(_) => MessageKind::EventQueryResponse,
            WireMessage::EventCountRequest(_) => MessageKind::EventCountRequest,
            WireMessage::EventCountResponse(_) => MessageKind::EventCountResponse,
            WireMessage::Error(_) => MessageKind::Error,
            WireMessage::SenderTagRequest(_) => MessageKind::SenderTagRequest,
            WireMessage::SenderTagResponse(_) => MessageKind::SenderTagResponse,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            WireMessage::TimeProbeRequest
            | WireMessage::DirectoryRequest
            | WireMessage::TimeRangeRequest
            | WireMessage::VersionRequest => Vec::new(),
            WireMessage::TimeProbeResponse(b) => b.encode_to_vec(),
            WireMessage::DirectoryResponse(b) => b.encode_to_vec(),
            WireMessage::TimeRangeResponse(b) => b.encode_to_vec(),
            WireMessage::VersionResponse(b) => b.encode_to_vec(),
            WireMessage::TimeseriesRequest(b) => b.encode_to_vec(),
            WireMessage::TimeseriesResponse(b) => b.encode_to_vec(),
            WireMessage::EventQueryRequest(b) => b.encode_to_vec(),
            WireMessage::EventQueryResponse(b) => b.encode_to_vec(),
            WireMessage::EventCountRequest(b) => b.encode_to_vec(),
            WireMessage::EventCountResponse(b) => b.encode_to_vec(),
            WireMessage::Error(b) => b.encode_to_vec(),
            WireMessage::SenderTagRequest(b) => b.encode_to_vec(),
            WireMessage::SenderTagResponse(b) => b.encode_to_vec(),
        }
    }

    fn decode_body(kind: MessageKind, body: &[u8]) -> Result<Self> {
        let msg = match kind {
            MessageKind::Unspecified => {
                return Err(HistorianError::Codec("envelope without a message kind".to_string()))
            }
            MessageKind::TimeProbeRequest => WireMessage::TimeProbeRequest,
            MessageKind::TimeProbeResponse => WireMessage::TimeProbeResponse(TimeProbeReply::decode(body)?),
            MessageKind::DirectoryRequest => WireMessage::DirectoryRequest,
            MessageKind::DirectoryResponse => WireMessage::DirectoryResponse(DirectoryReply::decode(body)?),
            MessageKind::TimeRangeRequest => WireMessage::TimeRangeRequest,
            MessageKind::TimeRangeResponse => WireMessage::TimeRangeResponse(TimeRangeReply::decode(body)?),
            MessageKind::VersionRequest => WireMessage::VersionRequest,
            MessageKind::VersionResponse => WireMessage::VersionResponse(VersionReply::decode(body)?),
            MessageKind::TimeseriesRequest => WireMessage::TimeseriesRequest(TimeseriesRequestBody::decode(body)?),
            MessageKind::TimeseriesResponse => WireMessage::TimeseriesResponse(TimeseriesReply::decode(body)?),
            MessageKind::EventQueryRequest => WireMessage::EventQueryRequest(EventFilter::decode(body)?),
            MessageKind::EventQueryResponse => WireMessage::EventQueryResponse(EventQueryReply::decode(body)?),
            MessageKind::EventCountRequest => WireMessage::EventCountRequest(EventFilter::decode(body)?),
            MessageKind::EventCountResponse => WireMessage::EventCountResponse(EventCountReply::decode(body)?),
            MessageKind::Error => WireMessage::Error(ErrorReply::decode(body)?),
            MessageKind::SenderTagRequest => WireMessage::SenderTagRequest(SenderTagRequestBody::decode(body)?),
            MessageKind::SenderTagResponse => WireMessage::SenderTagResponse(SenderTagReply::decode(body)?),
        };
        Ok(msg)
    }
}

/// One message together with its correlation identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub request_id: RequestId,
    pub message: WireMessage,
}

impl Frame {
    pub fn new(request_id: RequestId, message: WireMessage) -> Self {
        Self { request_id, message }
    }
}

/// Encodes and decodes whole frames.
pub trait EnvelopeCodec: Send + Sync + 'static {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Frame>;
}

/// [`EnvelopeCodec`] for the protobuf schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProstCodec;

impl EnvelopeCodec for ProstCodec {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let envelope = Envelope {
            kind: frame.message.kind() as i32,
            request_id: frame.request_id.get(),
            body: frame.message.encode_body(),
        };
        Ok(envelope.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Frame> {
        let envelope = Envelope::decode(bytes)?;
        let kind = MessageKind::try_from(envelope.kind)
            .map_err(|_| HistorianError::Codec(format!("unknown message kind {}", envelope.kind)))?;
        let message = WireMessage::decode_body(kind, &envelope.body)?;
        Ok(Frame::new(RequestId::new(envelope.request_id), message))
    }
}
