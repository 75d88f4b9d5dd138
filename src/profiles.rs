use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::TranscodeError;

/// Target bitrate in whole kilobits per second, rendered as `512k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate(u32);

impl Bitrate {
    pub const fn kbps(value: u32) -> Self {
        Self(value)
    }

    pub fn as_kbps(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.0)
    }
}

impl FromStr for Bitrate {
    type Err = TranscodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed.strip_suffix(['k', 'K']).unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| TranscodeError::config(format!("invalid bitrate '{value}'")))
    }
}

impl TryFrom<String> for Bitrate {
    type Error = TranscodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bitrate> for String {
    fn from(value: Bitrate) -> Self {
        value.to_string()
    }
}

/// Output frame size, rendered as `WIDTHxHEIGHT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = TranscodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || TranscodeError::config(format!("invalid resolution '{value}'"));
        let (width, height) = value.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        Ok(Self {
            width: width.parse().map_err(|_| invalid())?,
            height: height.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for Resolution {
    type Error = TranscodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Raw encoder arguments that only apply when the profile's video codec is `encoder`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodecExtraOpts {
    pub encoder: String,
    pub args: Vec<String>,
}

impl CodecExtraOpts {
    pub fn new<I, S>(encoder: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encoder: encoder.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub name: String,
    pub resolution: Resolution,
    pub video_bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    pub max_rate_multiplier: f64,
    pub gop_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    pub video_codec: String,
    pub audio_codec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codec_extra_opts: Vec<CodecExtraOpts>,
}

impl EncodingProfile {
    /// Hard cap derived from the base bitrate, truncated to whole kbps.
    pub fn max_rate(&self) -> Bitrate {
        let capped = f64::from(self.video_bitrate.as_kbps()) * self.max_rate_multiplier;
        Bitrate::kbps(capped.floor() as u32)
    }

    pub fn buffer_size(&self) -> Bitrate {
        Bitrate::kbps(self.max_rate().as_kbps().saturating_mul(2))
    }

    /// The single extra option set matching this profile's video encoder, if any.
    pub fn extra_opts_for_codec(&self) -> Option<&CodecExtraOpts> {
        self.codec_extra_opts
            .iter()
            .find(|opts| opts.encoder == self.video_codec)
    }

    fn validate(&self) -> Result<(), TranscodeError> {
        if self.name.trim().is_empty() {
            return Err(TranscodeError::config("profile name must not be empty"));
        }
        if !self.max_rate_multiplier.is_finite() || self.max_rate_multiplier < 1.0 {
            return Err(TranscodeError::config(format!(
                "profile '{}': max_rate_multiplier must be >= 1, got {}",
                self.name, self.max_rate_multiplier
            )));
        }
        if self.gop_size == 0 {
            return Err(TranscodeError::config(format!(
                "profile '{}': gop_size must be greater than zero",
                self.name
            )));
        }
        if self.video_bitrate.as_kbps() == 0 {
            return Err(TranscodeError::config(format!(
                "profile '{}': video_bitrate must be greater than zero",
                self.name
            )));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(TranscodeError::config(format!(
                "profile '{}': resolution must be non-zero",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ProfileRegistry {
    profiles: Vec<EncodingProfile>,
}

impl ProfileRegistry {
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                EncodingProfile {
                    name: "high".into(),
                    resolution: Resolution::new(1280, 720),
                    video_bitrate: Bitrate::kbps(512),
                    audio_bitrate: Bitrate::kbps(48),
                    max_rate_multiplier: 1.3,
                    gop_size: 40,
                    preset: Some("superfast".into()),
                    video_codec: "libx265".into(),
                    audio_codec: "aac".into(),
                    output_fps: Some(20),
                    codec_extra_opts: vec![CodecExtraOpts::new(
                        "libx265",
                        [
                            "-tune",
                            "zerolatency",
                            "-x265-params",
                            "aq-mode=2:aq-strength=0.8:psy-rd=1.5:rdoq=1",
                        ],
                    )],
                },
                EncodingProfile {
                    name: "low".into(),
                    resolution: Resolution::new(1280, 720),
                    video_bitrate: Bitrate::kbps(192),
                    audio_bitrate: Bitrate::kbps(24),
                    max_rate_multiplier: 2.0,
                    gop_size: 60,
                    preset: Some("superfast".into()),
                    video_codec: "libx265".into(),
                    audio_codec: "aac".into(),
                    output_fps: Some(15),
                    codec_extra_opts: vec![CodecExtraOpts::new(
                        "libx265",
                        [
                            "-tune",
                            "zerolatency",
                            "-x265-params",
                            "rc-lookahead=10:aq-mode=2:aq-strength=1.0:psy-rd=1.5:rdoq=1",
                        ],
                    )],
                },
                EncodingProfile {
                    name: "quality".into(),
                    resolution: Resolution::new(1280, 720),
                    video_bitrate: Bitrate::kbps(256),
                    audio_bitrate: Bitrate::kbps(32),
                    max_rate_multiplier: 2.5,
                    gop_size: 100,
                    preset: Some("fast".into()),
                    video_codec: "libx265".into(),
                    audio_codec: "aac".into(),
                    output_fps: Some(15),
                    codec_extra_opts: vec![CodecExtraOpts::new(
                        "libx265",
                        [
                            "-x265-params",
                            "rc-lookahead=30:aq-mode=2:aq-strength=1.0:psy-rd=2.0:rdoq=2:qpmin=10:qpmax=51:nr-intra=8:nr-inter=8",
                        ],
                    )],
                },
            ],
        }
    }

    /// Builds a registry from externally supplied profiles, enforcing the profile invariants.
    pub fn from_profiles(profiles: Vec<EncodingProfile>) -> Result<Self, TranscodeError> {
        if profiles.is_empty() {
            return Err(TranscodeError::config("profile list must not be empty"));
        }

        {
            let mut seen = HashSet::new();
            for profile in &profiles {
                profile.validate()?;
                if !seen.insert(profile.name.as_str()) {
                    return Err(TranscodeError::config(format!(
                        "duplicate profile name '{}'",
                        profile.name
                    )));
                }
            }
        }

        Ok(Self { profiles })
    }

    pub fn lookup(&self, name: &str) -> Option<&EncodingProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|profile| profile.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodingProfile> {
        self.profiles.iter()
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
