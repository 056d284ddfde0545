use crate::ledger::PtsLedger;
use crate::media::{EncodedPacket, Encode, Scale, Sink, Source, SourceFormat, Timestamped};
use crate::rule::{DefectKind, DefectRuleSet};
use crate::scheduler::{Decision, DefectSchedulers};
use crate::timebase::{corrupt_pts, frame_duration, rescale, Rational};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error that stops the pipeline, labelled by the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reading from the input failed.
    #[error("failed to read packet: {0}")]
    Demux(BoxError),
    /// The decoder rejected a packet or failed to produce a frame.
    #[error("failed to decode packet: {0}")]
    Decode(BoxError),
    /// Converting a frame failed.
    #[error("failed to scale frame: {0}")]
    Scale(BoxError),
    /// The encoder rejected a frame or failed to produce a packet.
    #[error("failed to encode frame: {0}")]
    Encode(BoxError),
    /// Writing to the output failed.
    #[error("failed to write packet: {0}")]
    Mux(BoxError),
    /// The encoder time base and frame rate do not describe a frame duration.
    #[error("encoder time base {time_base} and frame rate {frame_rate} do not yield a frame duration")]
    Timing {
        /// The encoder time base.
        time_base: Rational,
        /// The encoder frame rate.
        frame_rate: Rational,
    },
}

impl PipelineError {
    fn demux(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Demux(Box::new(err))
    }

    fn decode(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Decode(Box::new(err))
    }

    fn scale(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Scale(Box::new(err))
    }

    fn encode(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Encode(Box::new(err))
    }

    fn mux(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Mux(Box::new(err))
    }
}

/// Counters collected over one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Video packets read from the input, dropped ones included.
    pub packets_read: u64,
    /// Video packets withheld from the decoder.
    pub input_packets_dropped: u64,
    /// Frames produced by the decoder.
    pub frames_decoded: u64,
    /// Frames interpreted with the mismatched pixel format.
    pub pixel_format_corrupted: u64,
    /// Frames whose presentation timestamp was rewritten.
    pub pts_corrupted: u64,
    /// Packets produced by the encoder.
    pub packets_encoded: u64,
    /// Encoded packets whose presentation timestamp was restored.
    pub pts_restored: u64,
    /// Encoded packets withheld from the muxer.
    pub output_packets_dropped: u64,
    /// Packets handed to the muxer.
    pub packets_written: u64,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    source: Rational,
    codec: Rational,
    sink: Rational,
    frame_duration: i64,
}

/// Moves the selected video stream from a [`Source`] through a [`Scale`] and an
/// [`Encode`] into a [`Sink`], injecting defects along the way.
///
/// The pipeline owns the backends, one scheduler per defect kind and the
/// timestamp ledger. Everything runs on the calling thread.
pub struct Pipeline<S, C, E, M> {
    source: S,
    scaler: C,
    encoder: E,
    sink: M,
    schedulers: DefectSchedulers,
    ledger: PtsLedger,
    take_frame: Option<u64>,
    stats: PipelineStats,
}

impl<S, C, E, M> Pipeline<S, C, E, M>
where
    S: Source,
    C: Scale<Input = S::Frame>,
    E: Encode<Frame = C::Output>,
    M: Sink<Packet = E::Packet>,
{
    /// Creates a pipeline with fresh schedulers for `rules` and no packet limit.
    pub fn new(source: S, scaler: C, encoder: E, sink: M, rules: &DefectRuleSet) -> Self {
        Self {
            source,
            scaler,
            encoder,
            sink,
            schedulers: DefectSchedulers::new(rules),
            ledger: PtsLedger::new(),
            take_frame: None,
            stats: PipelineStats::default(),
        }
    }

    /// Stops reading after `limit` video packets. `None` reads the whole input.
    pub fn take_frame(mut self, limit: Option<u64>) -> Self {
        self.take_frame = limit;
        self
    }

    /// Runs the pipeline to completion.
    ///
    /// After the last packet the decoder is drained, the encoder is flushed and
    /// the sink is finished. Any backend error stops the run.
    pub fn run(mut self) -> Result<PipelineStats, PipelineError> {
        let timing = self.timing()?;

        tracing::info!(
            source_time_base = %timing.source,
            codec_time_base = %timing.codec,
            sink_time_base = %timing.sink,
            frame_duration = timing.frame_duration,
            take_frame = ?self.take_frame,
            "starting pipeline"
        );

        while self.take_frame.is_none_or(|limit| self.stats.packets_read < limit) {
            let Some(packet) = self.source.read_packet().map_err(PipelineError::demux)? else {
                tracing::debug!("end of input");
                break;
            };

            self.stats.packets_read += 1;

            if self.schedulers.query(DefectKind::DropInputPacket).fires() {
                tracing::trace!(packet = self.stats.packets_read, "input packet dropped");
                self.stats.input_packets_dropped += 1;
                continue;
            }

            self.source.send_packet(&packet).map_err(PipelineError::decode)?;
            self.drain_decoder(timing)?;
        }

        self.source.send_eof().map_err(PipelineError::decode)?;
        self.drain_decoder(timing)?;

        self.encoder.send_frame(None).map_err(PipelineError::encode)?;
        self.drain_encoder(timing)?;

        self.sink.finish().map_err(PipelineError::mux)?;

        let stats = self.stats;
        tracing::info!(
            packets_read = stats.packets_read,
            input_packets_dropped = stats.input_packets_dropped,
            frames_decoded = stats.frames_decoded,
            pixel_format_corrupted = stats.pixel_format_corrupted,
            pts_corrupted = stats.pts_corrupted,
            packets_encoded = stats.packets_encoded,
            pts_restored = stats.pts_restored,
            output_packets_dropped = stats.output_packets_dropped,
            packets_written = stats.packets_written,
            "pipeline finished"
        );

        Ok(stats)
    }

    fn timing(&self) -> Result<Timing, PipelineError> {
        let codec = self.encoder.time_base();
        let frame_rate = self.encoder.frame_rate();

        let frame_duration = frame_duration(codec, frame_rate).ok_or(PipelineError::Timing {
            time_base: codec,
            frame_rate,
        })?;

        Ok(Timing {
            source: self.source.time_base(),
            codec,
            sink: self.sink.time_base(),
            frame_duration,
        })
    }

    fn drain_decoder(&mut self, timing: Timing) -> Result<(), PipelineError> {
        while let Some(frame) = self.source.receive_frame().map_err(PipelineError::decode)? {
            self.process_frame(frame, timing)?;
        }

        Ok(())
    }

    fn process_frame(&mut self, mut frame: S::Frame, timing: Timing) -> Result<(), PipelineError> {
        self.stats.frames_decoded += 1;

        let original = frame.pts().and_then(|pts| rescale(pts, timing.source, timing.codec));
        frame.set_pts(original);

        let format = if self.schedulers.query(DefectKind::ChangePixelFormat).fires() {
            self.stats.pixel_format_corrupted += 1;
            SourceFormat::Mismatched
        } else {
            SourceFormat::Native
        };

        let mut scaled = self.scaler.scale(&frame, format).map_err(PipelineError::scale)?;

        let decision = self.schedulers.query(DefectKind::PtsDrop);
        if let (Decision::Fire { fired_before }, Some(original)) = (decision, original) {
            let corrupted = corrupt_pts(original, fired_before, timing.frame_duration);
            self.ledger.record(corrupted, original);
            scaled.set_pts(Some(corrupted));
            self.stats.pts_corrupted += 1;
        }

        tracing::debug!(
            frame = self.stats.frames_decoded,
            original_pts = ?original,
            pts = ?scaled.pts(),
            ?format,
            "sending frame to encoder"
        );

        self.encoder.send_frame(Some(&scaled)).map_err(PipelineError::encode)?;
        self.drain_encoder(timing)
    }

    fn drain_encoder(&mut self, timing: Timing) -> Result<(), PipelineError> {
        while let Some(mut packet) = self.encoder.receive_packet().map_err(PipelineError::encode)? {
            self.stats.packets_encoded += 1;

            if let Some(original) = packet.pts().and_then(|pts| self.ledger.restore(pts)) {
                packet.set_pts(Some(original));
                self.stats.pts_restored += 1;
            }

            packet.set_duration(Some(timing.frame_duration));
            packet.rescale_ts(timing.codec, timing.sink);

            if self.schedulers.query(DefectKind::DropOutputPacket).fires() {
                tracing::trace!(pts = ?packet.pts(), "output packet dropped");
                self.stats.output_packets_dropped += 1;
                continue;
            }

            tracing::trace!(pts = ?packet.pts(), dts = ?packet.dts(), "writing packet");
            self.sink.write_packet(&mut packet).map_err(PipelineError::mux)?;
            self.stats.packets_written += 1;
        }

        Ok(())
    }
}
