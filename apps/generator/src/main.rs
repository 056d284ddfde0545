//! Transcodes the first video stream of a file into a fragmented mp4 while
//! injecting reproducible defects: dropped input packets, dropped output
//! packets, rewritten timestamps and frames decoded with the wrong pixel format.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use defects_core::{Pipeline, PipelineStats};
use defects_ffmpeg::dict::Dictionary;
use defects_ffmpeg::encoder::{VideoEncoder, VideoEncoderSettings};
use defects_ffmpeg::error::FfmpegError;
use defects_ffmpeg::muxer::{Muxer, MuxerOptions};
use defects_ffmpeg::scaler::FrameScaler;
use defects_ffmpeg::source::VideoSource;
use defects_ffmpeg::{log, pixel_format};

use crate::config::{ConfigError, EncoderConfig, Options, Settings};

mod config;

/// Removes a partially written output file unless it was finished or the user asked to keep it.
struct PartialOutput {
    path: PathBuf,
    armed: bool,
}

impl PartialOutput {
    fn new(path: &Path, keep: bool) -> Self {
        Self {
            path: path.to_owned(),
            armed: !keep,
        }
    }

    fn finish(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(path = %self.path.display(), "removed partial output"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(path = %self.path.display(), error = %err, "failed to remove partial output"),
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .map_err(|err| ConfigError::invalid("log_level", err))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))
}

/// The text printed on stdout for a settings error, and the process exit code.
///
/// Usage errors collapse to their first line and fail. `--help` and
/// `--version` print in full and succeed.
fn config_error_report(err: &ConfigError) -> (String, u8) {
    match err {
        ConfigError::Clap(err) if !err.use_stderr() => (err.render().to_string(), 0),
        ConfigError::Clap(err) => {
            let rendered = err.render().to_string();
            let line = rendered.lines().next().unwrap_or_default();
            (line.strip_prefix("error: ").unwrap_or(line).to_owned(), 1)
        }
        err => (err.to_string(), 1),
    }
}

fn codec_options(encoder: &EncoderConfig) -> Result<Dictionary, FfmpegError> {
    let mut options = Dictionary::new();

    if !encoder.preset.is_empty() {
        options.set("preset", &encoder.preset)?;
    }

    if !encoder.codec_params.is_empty() {
        options.set("x264-params", &encoder.codec_params)?;
    }

    Ok(options)
}

fn open_source(path: &Path) -> anyhow::Result<VideoSource> {
    VideoSource::open(path).map_err(|err| match err {
        FfmpegError::NoStream => anyhow::anyhow!("no video stream found in {}", path.display()),
        err => anyhow::Error::new(err).context(format!("failed to open input {}", path.display())),
    })
}

fn run(settings: &Settings) -> anyhow::Result<PipelineStats> {
    settings.validate()?;

    let input = settings.input_file()?;
    let output = settings.output_file.as_path();
    let rules = settings.rules()?;
    let mismatched_format = pixel_format::from_name(&settings.mismatched_pixel_format)
        .map_err(|err| ConfigError::invalid("mismatched_pixel_format", err))?;

    log::set_log_level(settings.ffmpeg_log_level()?);

    let source = open_source(input)?;

    let partial = PartialOutput::new(output, settings.keep_partial_output);
    let mut muxer = Muxer::open(output, MuxerOptions::default())
        .with_context(|| format!("failed to open output {}", output.display()))?;

    let encoder_settings = VideoEncoderSettings::builder()
        .width(source.width())
        .height(source.height())
        .frame_rate(source.frame_rate())
        .bitrate(settings.encoder.bitrate)
        .rc_buffer_size(settings.encoder.rc_buffer_size()?)
        .rc_min_rate(settings.encoder.rc_rate())
        .rc_max_rate(settings.encoder.rc_rate())
        .thread_count(settings.encoder.thread_count)
        .gop_size(settings.encoder.gop_size)
        .codec_options(codec_options(&settings.encoder)?)
        .build();

    let encoder = VideoEncoder::new(&settings.encoder.codec, &mut muxer, encoder_settings)
        .with_context(|| format!("failed to open encoder {}", settings.encoder.codec))?;

    let scaler = FrameScaler::new(encoder.width(), encoder.height(), encoder.pixel_format())
        .context("failed to create scaler")?
        .with_mismatched_format(mismatched_format);

    muxer.write_header().context("failed to write header")?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        codec = %settings.encoder.codec,
        "transcoding"
    );

    let stats = Pipeline::new(source, scaler, encoder, muxer, &rules)
        .take_frame(settings.take_frame()?)
        .run()?;

    partial.finish();

    Ok(stats)
}

fn main() -> ExitCode {
    let options = Options::from_env();

    if options.argv.len() <= 1 {
        let _ = crate::config::command().print_help();
        return ExitCode::FAILURE;
    }

    let settings = match crate::config::parse_settings(options) {
        Ok(settings) => settings,
        Err(err) => {
            let (message, code) = config_error_report(&err);
            println!("{}", message.trim_end());
            return ExitCode::from(code);
        }
    };

    if let Err(err) = init_tracing(&settings.log_level) {
        println!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(&settings) {
        Ok(stats) => {
            tracing::info!(output = %settings.output_file.display(), packets = stats.packets_written, "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::path::Path;

    use super::{codec_options, config_error_report, open_source, PartialOutput};
    use crate::config::{parse_settings, ConfigError, EncoderConfig, Options};

    fn parse_error(args: &[&str]) -> ConfigError {
        parse_settings(Options {
            argv: std::iter::once("video-defects-generator")
                .chain(args.iter().copied())
                .map(str::to_owned)
                .collect(),
            env_prefix: None,
        })
        .expect_err("invalid command line")
    }

    #[test]
    fn test_usage_errors_exit_with_one() {
        for args in [
            &["--pts_drop_step", "three"][..],
            &["--unknown_flag"][..],
            &["--override", "no-equals-sign"][..],
        ] {
            let (message, code) = config_error_report(&parse_error(args));
            assert_eq!(code, 1, "{args:?}");
            assert!(!message.trim_end().contains('\n'), "{message}");
            assert!(!message.starts_with("error: "), "{message}");
        }

        let (message, _) = config_error_report(&parse_error(&["--pts_drop_step", "three"]));
        assert!(message.contains("--pts_drop_step"), "{message}");

        let (message, _) = config_error_report(&parse_error(&["--override", "no-equals-sign"]));
        assert_eq!(message, "Override must be in the format KEY=VALUE");
    }

    #[test]
    fn test_help_and_version_succeed() {
        let (message, code) = config_error_report(&parse_error(&["--help"]));
        assert_eq!(code, 0);
        assert!(message.contains("--pts_drop_step"), "{message}");

        let (message, code) = config_error_report(&parse_error(&["--version"]));
        assert_eq!(code, 0);
        assert!(message.contains(env!("CARGO_PKG_VERSION")), "{message}");
    }

    #[test]
    fn test_settings_errors_exit_with_one() {
        let (message, code) = config_error_report(&ConfigError::MissingInput);
        assert_eq!((message.as_str(), code), ("missing required argument --input_file", 1));
    }

    #[test]
    fn test_partial_output_removed_unless_finished() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");

        let removed = dir.path().join("removed.mp4");
        std::fs::write(&removed, b"partial").expect("failed to write file");
        drop(PartialOutput::new(&removed, false));
        assert!(!removed.exists());

        let kept = dir.path().join("kept.mp4");
        std::fs::write(&kept, b"partial").expect("failed to write file");
        drop(PartialOutput::new(&kept, true));
        assert!(kept.exists());

        let finished = dir.path().join("finished.mp4");
        std::fs::write(&finished, b"complete").expect("failed to write file");
        PartialOutput::new(&finished, false).finish();
        assert!(finished.exists());

        drop(PartialOutput::new(&dir.path().join("missing.mp4"), false));
    }

    #[test]
    fn test_codec_options() {
        let options = codec_options(&EncoderConfig::default()).expect("valid options");
        assert_eq!(options.get("preset").as_deref(), Some("fast"));
        assert_eq!(
            options.get("x264-params").as_deref(),
            Some("keyint=60:min-keyint=60:scenecut=0:force-cfr=1")
        );

        let empty = EncoderConfig {
            preset: String::new(),
            codec_params: String::new(),
            ..Default::default()
        };
        assert!(codec_options(&empty).expect("valid options").is_empty());
    }

    #[test]
    fn test_open_source_messages() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let missing = dir.path().join("missing.mp4");

        let message = format!("{:#}", open_source(&missing).expect_err("missing input"));
        assert!(
            message.starts_with(&format!("failed to open input {}: ", missing.display())),
            "{message}"
        );

        assert!(open_source(Path::new("")).is_err());
    }
}
