use std::path::{Path, PathBuf};

use defects_core::{DefectKind, DefectRule, DefectRuleSet, RuleError};
use defects_ffmpeg::log::LogLevel;

/// Prefix of the environment variables read into [`Settings`], as in `VDG_OUTPUT_FILE`.
pub const ENV_PREFIX: &str = "VDG";

const PATH_FLAGS: [&str; 2] = ["input_file", "output_file"];

const INT_FLAGS: [&str; 9] = [
    "drop_input_packet_step",
    "drop_input_packet_count",
    "drop_output_packet_step",
    "drop_output_packet_count",
    "pts_drop_step",
    "pts_drop_count",
    "change_pixel_format_step",
    "change_pixel_format_count",
    "take_frame",
];

const STRING_FLAGS: [&str; 3] = ["log_level", "ffmpeg_log_level", "mismatched_pixel_format"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Clap(#[from] clap::Error),
    #[error("missing required argument --input_file")]
    MissingInput,
    #[error("invalid value for --{flag}: {reason}")]
    InvalidValue { flag: String, reason: String },
}

impl ConfigError {
    pub fn invalid(flag: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            flag: flag.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<RuleError> for ConfigError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Step { kind, value } => Self::invalid(format!("{kind}_step"), format!("{value} (expected -1 or a value >= 0)")),
            RuleError::Count { kind, value } => Self::invalid(format!("{kind}_count"), format!("{value} (expected a value >= 1)")),
        }
    }
}

/// How the encoder is opened. The defaults reproduce a constant frame rate x264 stream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, smart_default::SmartDefault)]
#[serde(default)]
pub struct EncoderConfig {
    #[default = "libx264"]
    pub codec: String,
    #[default(12_000_000)]
    pub bitrate: i64,
    #[default(3)]
    pub thread_count: i32,
    #[default(60)]
    pub gop_size: i32,
    /// Passed as the `preset` codec option, skipped when empty.
    #[default = "fast"]
    pub preset: String,
    /// Passed as the `x264-params` codec option, skipped when empty.
    #[default = "keyint=60:min-keyint=60:scenecut=0:force-cfr=1"]
    pub codec_params: String,
}

impl EncoderConfig {
    /// The rate control buffer, twice the bitrate.
    pub fn rc_buffer_size(&self) -> Result<i32, ConfigError> {
        self.bitrate
            .checked_mul(2)
            .and_then(|size| i32::try_from(size).ok())
            .ok_or_else(|| ConfigError::invalid("encoder.bitrate", format!("{} is too large", self.bitrate)))
    }

    /// The minimum and maximum rate, one and a half times the bitrate.
    pub fn rc_rate(&self) -> i64 {
        self.bitrate.saturating_mul(3) / 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.codec.is_empty() {
            return Err(ConfigError::invalid("encoder.codec", "cannot be empty"));
        }

        if self.bitrate <= 0 {
            return Err(ConfigError::invalid("encoder.bitrate", format!("{} (expected a value >= 1)", self.bitrate)));
        }

        if self.thread_count < 0 {
            return Err(ConfigError::invalid(
                "encoder.thread_count",
                format!("{} (expected a value >= 0)", self.thread_count),
            ));
        }

        if self.gop_size < 0 {
            return Err(ConfigError::invalid("encoder.gop_size", format!("{} (expected a value >= 0)", self.gop_size)));
        }

        self.rc_buffer_size()?;

        Ok(())
    }
}

/// Everything the generator can be configured with.
///
/// Values are merged from the config files, then `VDG_*` environment
/// variables, then `--override` and the individual command line flags.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, smart_default::SmartDefault)]
#[serde(default)]
pub struct Settings {
    pub input_file: Option<PathBuf>,
    #[default(PathBuf::from("output.mp4"))]
    pub output_file: PathBuf,
    #[default(-1)]
    pub drop_input_packet_step: i64,
    #[default(1)]
    pub drop_input_packet_count: i64,
    #[default(-1)]
    pub drop_output_packet_step: i64,
    #[default(1)]
    pub drop_output_packet_count: i64,
    #[default(-1)]
    pub pts_drop_step: i64,
    #[default(1)]
    pub pts_drop_count: i64,
    #[default(-1)]
    pub change_pixel_format_step: i64,
    #[default(1)]
    pub change_pixel_format_count: i64,
    /// The number of video packets to read, `-1`, `0` or unset for the whole input.
    pub take_frame: Option<i64>,
    #[default = "info"]
    pub log_level: String,
    #[default = "error"]
    pub ffmpeg_log_level: String,
    pub keep_partial_output: bool,
    #[default = "yuv411p"]
    pub mismatched_pixel_format: String,
    pub encoder: EncoderConfig,
}

impl Settings {
    pub fn input_file(&self) -> Result<&Path, ConfigError> {
        self.input_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingInput)
    }

    /// The `(step, count)` pair configured for `kind`.
    pub const fn rule_values(&self, kind: DefectKind) -> (i64, i64) {
        match kind {
            DefectKind::DropInputPacket => (self.drop_input_packet_step, self.drop_input_packet_count),
            DefectKind::DropOutputPacket => (self.drop_output_packet_step, self.drop_output_packet_count),
            DefectKind::PtsDrop => (self.pts_drop_step, self.pts_drop_count),
            DefectKind::ChangePixelFormat => (self.change_pixel_format_step, self.change_pixel_format_count),
        }
    }

    pub fn rules(&self) -> Result<DefectRuleSet, ConfigError> {
        DefectKind::ALL
            .into_iter()
            .try_fold(DefectRuleSet::default(), |rules, kind| -> Result<_, ConfigError> {
                let (step, count) = self.rule_values(kind);
                Ok(rules.with(kind, DefectRule::new(kind, step, count)?))
            })
    }

    pub fn take_frame(&self) -> Result<Option<u64>, ConfigError> {
        match self.take_frame {
            None | Some(-1 | 0) => Ok(None),
            Some(limit) => u64::try_from(limit)
                .map(Some)
                .map_err(|_| ConfigError::invalid("take_frame", format!("{limit} (expected -1 or a value >= 0)"))),
        }
    }

    pub fn ffmpeg_log_level(&self) -> Result<LogLevel, ConfigError> {
        self.ffmpeg_log_level
            .parse()
            .map_err(|err| ConfigError::invalid("ffmpeg_log_level", err))
    }

    /// Checks every value that can be checked without opening any media.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.input_file()?;
        self.rules()?;
        self.take_frame()?;
        self.ffmpeg_log_level()?;
        self.encoder.validate()
    }
}

/// Where settings are read from.
#[derive(Debug, Clone)]
pub struct Options {
    /// The command line, including the program name.
    pub argv: Vec<String>,
    /// Environment variables prefix, `None` to ignore the environment.
    pub env_prefix: Option<&'static str>,
}

impl Options {
    pub fn from_env() -> Self {
        Self {
            argv: std::env::args().collect(),
            env_prefix: Some(ENV_PREFIX),
        }
    }
}

pub fn command() -> clap::Command {
    let mut command = clap::Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file(s)")
                .action(clap::ArgAction::Append),
        )
        .arg(
            clap::Arg::new("overrides")
                .long("override")
                .short('o')
                .alias("set")
                .value_name("KEY=VALUE")
                .help("Provide an override for a configuration value, in the format KEY=VALUE")
                .action(clap::ArgAction::Append),
        );

    for flag in PATH_FLAGS {
        command = command.arg(clap::Arg::new(flag).long(flag).value_name("path"));
    }

    for flag in INT_FLAGS {
        command = command.arg(
            clap::Arg::new(flag)
                .long(flag)
                .value_name("int")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i64)),
        );
    }

    for flag in STRING_FLAGS {
        command = command.arg(clap::Arg::new(flag).long(flag).value_name("name"));
    }

    command.arg(
        clap::Arg::new("keep_partial_output")
            .long("keep_partial_output")
            .help("Keep the output file when the run fails")
            .action(clap::ArgAction::SetTrue),
    )
}

pub fn parse_settings(options: Options) -> Result<Settings, ConfigError> {
    let matches = command().try_get_matches_from(options.argv)?;
    let mut config = config::Config::builder();

    if let Some(config_files) = matches.get_many::<String>("config") {
        for path in config_files {
            config = config.add_source(config::File::from(Path::new(path)));
        }
    }

    if let Some(env_prefix) = options.env_prefix {
        config = config.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
    }

    if let Some(overrides) = matches.get_many::<String>("overrides") {
        for ov in overrides {
            let (key, value) = ov.split_once('=').ok_or_else(|| {
                clap::Error::raw(
                    clap::error::ErrorKind::InvalidValue,
                    "Override must be in the format KEY=VALUE",
                )
            })?;

            config = config.set_override(key, value)?;
        }
    }

    for flag in PATH_FLAGS.into_iter().chain(STRING_FLAGS) {
        if let Some(value) = matches.get_one::<String>(flag) {
            config = config.set_override(flag, value.as_str())?;
        }
    }

    for flag in INT_FLAGS {
        if let Some(&value) = matches.get_one::<i64>(flag) {
            config = config.set_override(flag, value)?;
        }
    }

    if matches.get_flag("keep_partial_output") {
        config = config.set_override("keep_partial_output", true)?;
    }

    Ok(config.build()?.try_deserialize()?)
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use defects_core::DefectKind;
    use defects_ffmpeg::log::LogLevel;

    use super::{parse_settings, ConfigError, Options, Settings};

    fn parse(args: &[&str]) -> Result<Settings, ConfigError> {
        parse_settings(Options {
            argv: std::iter::once("video-defects-generator")
                .chain(args.iter().copied())
                .map(str::to_owned)
                .collect(),
            env_prefix: None,
        })
    }

    #[test]
    fn test_settings_default() {
        insta::assert_debug_snapshot!(Settings::default(), @r#"
        Settings {
            input_file: None,
            output_file: "output.mp4",
            drop_input_packet_step: -1,
            drop_input_packet_count: 1,
            drop_output_packet_step: -1,
            drop_output_packet_count: 1,
            pts_drop_step: -1,
            pts_drop_count: 1,
            change_pixel_format_step: -1,
            change_pixel_format_count: 1,
            take_frame: None,
            log_level: "info",
            ffmpeg_log_level: "error",
            keep_partial_output: false,
            mismatched_pixel_format: "yuv411p",
            encoder: EncoderConfig {
                codec: "libx264",
                bitrate: 12000000,
                thread_count: 3,
                gop_size: 60,
                preset: "fast",
                codec_params: "keyint=60:min-keyint=60:scenecut=0:force-cfr=1",
            },
        }
        "#);

        assert_eq!(parse(&[]).expect("no arguments is valid"), Settings::default());
    }

    #[test]
    fn test_settings_flags() {
        let settings = parse(&[
            "--input_file",
            "input.mp4",
            "--output_file",
            "broken.mp4",
            "--drop_input_packet_step",
            "3",
            "--drop_input_packet_count",
            "2",
            "--pts_drop_step",
            "0",
            "--take_frame",
            "-1",
            "--keep_partial_output",
        ])
        .expect("valid flags");

        assert_eq!(settings.input_file().ok(), Some(Path::new("input.mp4")));
        assert_eq!(settings.output_file, Path::new("broken.mp4"));
        assert_eq!(settings.take_frame().ok(), Some(None));
        assert!(settings.keep_partial_output);

        let rules = settings.rules().expect("valid rules");
        assert_eq!(rules.get(DefectKind::DropInputPacket).activation_offset(), Some(3));
        assert_eq!(rules.get(DefectKind::DropInputPacket).repeat_count().get(), 2);
        assert_eq!(rules.get(DefectKind::PtsDrop).activation_offset(), Some(0));
        assert!(!rules.get(DefectKind::DropOutputPacket).is_enabled());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_overrides_and_files() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("failed to create tempfile");
        writeln!(
            file,
            r#"
            input_file = "from-file.mp4"
            take_frame = 5

            [encoder]
            codec = "mpeg4"
            bitrate = 1000000
            "#
        )
        .expect("failed to write config");

        let path = file.path().to_str().expect("utf-8 path");
        let settings = parse(&[
            "--config",
            path,
            "--override",
            "encoder.gop_size=12",
            "--input_file",
            "from-flag.mp4",
        ])
        .expect("valid settings");

        assert_eq!(settings.input_file().ok(), Some(Path::new("from-flag.mp4")));
        assert_eq!(settings.take_frame().ok(), Some(Some(5)));
        assert_eq!(settings.encoder.codec, "mpeg4");
        assert_eq!(settings.encoder.gop_size, 12);
        assert_eq!(settings.encoder.rc_buffer_size().ok(), Some(2_000_000));
        assert_eq!(settings.encoder.rc_rate(), 1_500_000);
        assert_eq!(settings.encoder.preset, "fast");
    }

    #[test]
    fn test_settings_environment() {
        std::env::set_var("VDG_SETTINGS_TEST_OUTPUT_FILE", "from-env.mp4");
        std::env::set_var("VDG_SETTINGS_TEST_ENCODER__THREAD_COUNT", "8");

        let settings = parse_settings(Options {
            argv: vec!["video-defects-generator".to_owned()],
            env_prefix: Some("VDG_SETTINGS_TEST"),
        })
        .expect("valid settings");

        assert_eq!(settings.output_file, Path::new("from-env.mp4"));
        assert_eq!(settings.encoder.thread_count, 8);
    }

    #[test]
    fn test_settings_validation_messages() {
        let message = |args: &[&str]| {
            let settings = parse(args).expect("flags parse");
            settings.validate().expect_err("invalid settings").to_string()
        };

        assert_eq!(message(&[]), "missing required argument --input_file");
        assert_eq!(
            message(&["--input_file", "in.mp4", "--pts_drop_step", "-2"]),
            "invalid value for --pts_drop_step: -2 (expected -1 or a value >= 0)"
        );
        assert_eq!(
            message(&["--input_file", "in.mp4", "--change_pixel_format_count", "0"]),
            "invalid value for --change_pixel_format_count: 0 (expected a value >= 1)"
        );
        assert_eq!(
            message(&["--input_file", "in.mp4", "--take_frame", "-3"]),
            "invalid value for --take_frame: -3 (expected -1 or a value >= 0)"
        );
        assert_eq!(
            message(&["--input_file", "in.mp4", "--ffmpeg_log_level", "loud"]),
            "invalid value for --ffmpeg_log_level: unknown log level: loud"
        );
        assert_eq!(
            message(&["--input_file", "in.mp4", "--override", "encoder.bitrate=0"]),
            "invalid value for --encoder.bitrate: 0 (expected a value >= 1)"
        );
    }

    #[test]
    fn test_settings_rejects_bad_flags() {
        assert!(matches!(parse(&["--pts_drop_step", "three"]), Err(ConfigError::Clap(_))));
        assert!(matches!(parse(&["--override", "no-equals-sign"]), Err(ConfigError::Clap(_))));
        assert!(matches!(parse(&["--unknown_flag"]), Err(ConfigError::Clap(_))));
    }

    #[test]
    fn test_settings_take_frame() {
        let take_frame = |value: &str| parse(&["--take_frame", value]).expect("valid flags").take_frame().ok();

        assert_eq!(take_frame("0"), Some(None));
        assert_eq!(take_frame("-1"), Some(None));
        assert_eq!(take_frame("1"), Some(Some(1)));
        assert_eq!(take_frame("120"), Some(Some(120)));
        assert_eq!(take_frame("-2"), None);
    }

    #[test]
    fn test_settings_rules_per_kind() {
        let settings = parse(&[
            "--drop_input_packet_step",
            "1",
            "--drop_output_packet_step",
            "2",
            "--pts_drop_step",
            "3",
            "--change_pixel_format_step",
            "4",
            "--change_pixel_format_count",
            "5",
        ])
        .expect("valid flags");
        let rules = settings.rules().expect("valid rules");

        for (kind, step) in [
            (DefectKind::DropInputPacket, 1),
            (DefectKind::DropOutputPacket, 2),
            (DefectKind::PtsDrop, 3),
            (DefectKind::ChangePixelFormat, 4),
        ] {
            assert_eq!(rules.get(kind).activation_offset(), Some(step), "{kind}");
        }

        assert_eq!(rules.get(DefectKind::ChangePixelFormat).repeat_count().get(), 5);
        assert_eq!(settings.rule_values(DefectKind::PtsDrop), (3, 1));
    }

    #[test]
    fn test_settings_log_level() {
        let settings = parse(&["--ffmpeg_log_level", "warning"]).expect("valid flags");
        assert_eq!(settings.ffmpeg_log_level().ok(), Some(LogLevel::Warning));
    }
}
