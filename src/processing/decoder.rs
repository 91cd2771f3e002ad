//! Decoder context: packets go in, frames come out

use std::collections::VecDeque;
use symphonia::core::audio::SignalSpec;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use crate::audio::frame::{self, Frame};
use crate::audio::NativeFormat;
use crate::error::{DecodeAudioError, Result};

/// Outcome of asking the decoder for a frame
#[derive(Debug)]
pub enum Receive {
    Frame(Frame),
    /// Nothing buffered; submit another packet
    Again,
    /// Flushed and fully drained
    Eof,
}

pub struct DecoderContext {
    decoder: Box<dyn Decoder>,
    codec_name: &'static str,
    pending: VecDeque<Frame>,
    last_output: Option<(NativeFormat, SignalSpec)>,
    draining: bool,
}

impl DecoderContext {
    pub fn open(params: &CodecParameters) -> Result<Self> {
        let codecs = symphonia::default::get_codecs();
        let descriptor = codecs
            .get_codec(params.codec)
            .ok_or_else(|| DecodeAudioError::codec_unavailable("Codec not found"))?;

        let decoder = codecs.make(params, &DecoderOptions::default()).map_err(|e| {
            let message = format!("Could not open codec {}: {}", descriptor.short_name, e);
            DecodeAudioError::context_allocation(message)
        })?;

        log::debug!("Opened decoder {} ({})", descriptor.short_name, descriptor.long_name);

        Ok(Self {
            decoder,
            codec_name: descriptor.short_name,
            pending: VecDeque::new(),
            last_output: None,
            draining: false,
        })
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec_name
    }

    /// Format and signal spec of the most recent decoded buffer
    pub fn last_output(&self) -> Option<(NativeFormat, SignalSpec)> {
        self.last_output
    }

    /// Submit one packet, or `None` to flush
    pub fn send_packet(&mut self, packet: Option<&Packet>) -> Result<()> {
        let Some(packet) = packet else {
            if !self.draining {
                self.draining = true;
                let codec = self.codec_name;
                match self.decoder.finalize().verify_ok {
                    Some(false) => log::warn!("{}: decoded audio failed verification", codec),
                    verify => log::debug!("{}: decoder flushed, verification {:?}", codec, verify),
                }
            }
            return Ok(());
        };

        if self.draining {
            return Err(DecodeAudioError::decode("Packet submitted after flush"));
        }

        let decoded = match self.decoder.decode(packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                let message = format!("Invalid data at ts {}: {}", packet.ts(), msg);
                return Err(DecodeAudioError::decode(message));
            }
            Err(e) => return Err(DecodeAudioError::decode(e.to_string())),
        };

        self.last_output = Some((frame::native_format(&decoded), *decoded.spec()));
        if decoded.frames() > 0 {
            let frame = Frame::from_buffer(&decoded, packet.ts())?;
            self.pending.push_back(frame);
        }
        Ok(())
    }

    pub fn receive_frame(&mut self) -> Receive {
        match self.pending.pop_front() {
            Some(frame) => Receive::Frame(frame),
            None if self.draining => Receive::Eof,
            None => Receive::Again,
        }
    }
}

impl std::fmt::Debug for DecoderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderContext")
            .field("codec", &self.codec_name)
            .field("pending", &self.pending.len())
            .field("draining", &self.draining)
            .finish()
    }
}
