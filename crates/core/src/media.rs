//! The capabilities the pipeline needs from a codec/container library.
//!
//! Drain style calls (`receive_frame`, `receive_packet`) return `Ok(None)` when
//! the library needs more input or has reached the end of the stream. Any
//! `Err` is fatal to the pipeline.

use crate::timebase::{rescale, Rational};

/// A media unit carrying a presentation timestamp.
pub trait Timestamped {
    /// The presentation timestamp, `None` if unset.
    fn pts(&self) -> Option<i64>;

    /// Sets the presentation timestamp.
    fn set_pts(&mut self, pts: Option<i64>);
}

/// An encoded packet leaving the encoder.
pub trait EncodedPacket: Timestamped {
    /// The decoding timestamp, `None` if unset.
    fn dts(&self) -> Option<i64>;

    /// Sets the decoding timestamp.
    fn set_dts(&mut self, dts: Option<i64>);

    /// The duration, `None` if unset.
    fn duration(&self) -> Option<i64>;

    /// Sets the duration.
    fn set_duration(&mut self, duration: Option<i64>);

    /// Converts every timestamp of the packet from `from` to `to`.
    ///
    /// Timestamps that cannot be represented in `to` become unset.
    fn rescale_ts(&mut self, from: Rational, to: Rational) {
        let convert = |ts: Option<i64>| ts.and_then(|ts| rescale(ts, from, to));

        self.set_pts(convert(self.pts()));
        self.set_dts(convert(self.dts()));
        self.set_duration(convert(self.duration()));
    }
}

/// Which pixel format a frame is interpreted with before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// The format the decoder produced.
    Native,
    /// A deliberately wrong format, producing a colorspace mismatch.
    Mismatched,
}

/// Demuxing and decoding of the selected video stream.
pub trait Source {
    /// A demuxed packet.
    type Packet;
    /// A decoded frame.
    type Frame: Timestamped;
    /// The error reported by the library.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads the next packet of the video stream, `None` at the end of the input.
    ///
    /// Packets of other streams are skipped.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, Self::Error>;

    /// Submits a packet to the decoder.
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), Self::Error>;

    /// Signals the end of the input to the decoder.
    fn send_eof(&mut self) -> Result<(), Self::Error>;

    /// Receives the next decoded frame.
    fn receive_frame(&mut self) -> Result<Option<Self::Frame>, Self::Error>;

    /// The time base of the video stream.
    fn time_base(&self) -> Rational;
}

/// Conversion of decoded frames to the encoder's resolution and pixel format.
pub trait Scale {
    /// A decoded frame.
    type Input;
    /// A frame ready for the encoder.
    type Output: Timestamped;
    /// The error reported by the library.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Converts `frame`, interpreting its pixels with `format`.
    ///
    /// The returned frame keeps the timestamps of the input.
    fn scale(&mut self, frame: &Self::Input, format: SourceFormat) -> Result<Self::Output, Self::Error>;
}

/// Encoding of frames into packets.
pub trait Encode {
    /// A raw frame.
    type Frame;
    /// An encoded packet.
    type Packet: EncodedPacket;
    /// The error reported by the library.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submits a frame, or `None` to flush the encoder.
    fn send_frame(&mut self, frame: Option<&Self::Frame>) -> Result<(), Self::Error>;

    /// Receives the next encoded packet.
    fn receive_packet(&mut self) -> Result<Option<Self::Packet>, Self::Error>;

    /// The codec time base.
    fn time_base(&self) -> Rational;

    /// The frame rate the encoder was opened with.
    fn frame_rate(&self) -> Rational;
}

/// Multiplexing and writing of packets to the container.
pub trait Sink {
    /// An encoded packet.
    type Packet;
    /// The error reported by the library.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes a packet to the container.
    fn write_packet(&mut self, packet: &mut Self::Packet) -> Result<(), Self::Error>;

    /// The time base of the output stream.
    fn time_base(&self) -> Rational;

    /// Finalizes the container.
    fn finish(&mut self) -> Result<(), Self::Error>;
}
