//! # Protobuf -> JSON codec
//!
//! A `tonic::codec::Codec` that writes [`DynamicMessage`]s and reads responses straight into
//! `serde_json::Value`, using the output `MessageDescriptor` to decode the wire bytes.
//!
//! Responses are rendered with the canonical protobuf JSON mapping, with two adjustments that
//! make them easier to decode into plain Rust types:
//!
//! * 64 bit integers are written as JSON numbers, not strings.
//! * Fields holding their default value are written out, so every declared field is present.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, SerializeOptions};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// Encodes prebuilt dynamic requests, decodes responses of a single message type to JSON.
pub struct DynamicCodec {
    output: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(output: MessageDescriptor) -> Self {
        Self { output }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = serde_json::Value;

    type Encoder = DynamicEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(self.output.clone())
    }
}

pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode_raw(dst);
        Ok(())
    }
}

pub struct JsonDecoder(MessageDescriptor);

impl Decoder for JsonDecoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = DynamicMessage::new(self.0.clone());
        message
            .merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode protobuf response: {e}")))?;

        to_json(&message)
            .map(Some)
            .map_err(|e| Status::internal(format!("Failed to map response to JSON: {e}")))
    }
}

/// Converts a JSON object into a message of the given type.
pub fn from_json(
    descriptor: MessageDescriptor,
    value: serde_json::Value,
) -> Result<DynamicMessage, serde_json::Error> {
    DynamicMessage::deserialize(descriptor, value)
}

/// Renders a message as JSON, see the module documentation for the options used.
pub fn to_json(message: &DynamicMessage) -> Result<serde_json::Value, serde_json::Error> {
    let options = SerializeOptions::new()
        .stringify_64_bit_integers(false)
        .skip_default_fields(false);

    message.serialize_with_options(serde_json::value::Serializer, &options)
}
