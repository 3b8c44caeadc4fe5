use std::ffi::OsString;

use anyhow::{bail, Result};
use pico_args::Arguments;

pub const USAGE: &str = r#"
openxr-playground
Exercises the OpenXR API with an OpenGL renderer.

USAGE:
    openxr-playground [FLAGS] [OPTIONS]

OPTIONS:
    --form_factor <NAME>        XR_FORM_FACTOR_HEAD_MOUNTED_DISPLAY (default)
                                XR_FORM_FACTOR_HANDHELD_DISPLAY
    --view_type <NAME>          XR_VIEW_CONFIGURATION_TYPE_PRIMARY_STEREO (default)
                                XR_VIEW_CONFIGURATION_TYPE_PRIMARY_MONO
    --play_space_type <NAME>    XR_REFERENCE_SPACE_TYPE_LOCAL (default)
                                XR_REFERENCE_SPACE_TYPE_STAGE
                                XR_REFERENCE_SPACE_TYPE_VIEW
    --refresh_rate <HZ>         Request a display refresh rate, if the runtime allows it

FLAGS:
    --joint_velocities          Query and draw hand joint velocities
    --no_hand_velocities        Don't query controller velocities
    --desktop                   Render the scene in a window, without an XR runtime
    -h, --help                  Print this message
"#;

/// An enumerant name that doesn't belong to the enum it was parsed as
#[derive(Debug, thiserror::Error)]
#[error("no value named {name} in {enum_name}")]
pub struct UnknownName {
    name: String,
    enum_name: &'static str,
}

/// Application settings, all taken from the command line
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub form_factor: xr::FormFactor,
    pub view_type: xr::ViewConfigurationType,
    pub play_space_type: xr::ReferenceSpaceType,
    /// Locate controllers with velocities and draw a velocity arrow
    pub query_hand_velocities: bool,
    /// Locate hand joints with velocities and draw a velocity arrow per joint
    pub query_joint_velocities: bool,
    pub refresh_rate: Option<f32>,
    pub desktop: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(Options),
    Help,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            form_factor: xr::FormFactor::HEAD_MOUNTED_DISPLAY,
            view_type: xr::ViewConfigurationType::PRIMARY_STEREO,
            play_space_type: xr::ReferenceSpaceType::LOCAL,
            query_hand_velocities: true,
            query_joint_velocities: false,
            refresh_rate: None,
            desktop: false,
        }
    }
}

impl Options {
    pub fn from_env() -> Result<Command> {
        Self::parse(Arguments::from_env())
    }

    pub fn from_vec(args: Vec<OsString>) -> Result<Command> {
        Self::parse(Arguments::from_vec(args))
    }

    fn parse(mut args: Arguments) -> Result<Command> {
        if args.contains(["-h", "--help"]) {
            return Ok(Command::Help);
        }

        let defaults = Self::default();
        let options = Self {
            form_factor: args
                .opt_value_from_fn("--form_factor", parse_form_factor)?
                .unwrap_or(defaults.form_factor),
            view_type: args
                .opt_value_from_fn("--view_type", parse_view_type)?
                .unwrap_or(defaults.view_type),
            play_space_type: args
                .opt_value_from_fn("--play_space_type", parse_reference_space_type)?
                .unwrap_or(defaults.play_space_type),
            refresh_rate: args.opt_value_from_str("--refresh_rate")?,
            query_joint_velocities: args.contains("--joint_velocities"),
            query_hand_velocities: !args.contains("--no_hand_velocities"),
            desktop: args.contains("--desktop"),
        };

        let remaining = args.finish();
        if !remaining.is_empty() {
            bail!("Unexpected arguments: {:?}", remaining);
        }

        if let Some(rate) = options.refresh_rate {
            if !(rate.is_finite() && rate > 0.0) {
                bail!("Refresh rate must be a positive number of Hz, got {}", rate);
            }
        }

        Ok(Command::Run(options))
    }
}

pub fn parse_form_factor(name: &str) -> Result<xr::FormFactor, UnknownName> {
    match name {
        "XR_FORM_FACTOR_HEAD_MOUNTED_DISPLAY" => Ok(xr::FormFactor::HEAD_MOUNTED_DISPLAY),
        "XR_FORM_FACTOR_HANDHELD_DISPLAY" => Ok(xr::FormFactor::HANDHELD_DISPLAY),
        _ => Err(UnknownName {
            name: name.to_owned(),
            enum_name: "XrFormFactor",
        }),
    }
}

pub fn parse_view_type(name: &str) -> Result<xr::ViewConfigurationType, UnknownName> {
    match name {
        "XR_VIEW_CONFIGURATION_TYPE_PRIMARY_MONO" => Ok(xr::ViewConfigurationType::PRIMARY_MONO),
        "XR_VIEW_CONFIGURATION_TYPE_PRIMARY_STEREO" => {
            Ok(xr::ViewConfigurationType::PRIMARY_STEREO)
        }
        _ => Err(UnknownName {
            name: name.to_owned(),
            enum_name: "XrViewConfigurationType",
        }),
    }
}

pub fn parse_reference_space_type(name: &str) -> Result<xr::ReferenceSpaceType, UnknownName> {
    match name {
        "XR_REFERENCE_SPACE_TYPE_VIEW" => Ok(xr::ReferenceSpaceType::VIEW),
        "XR_REFERENCE_SPACE_TYPE_LOCAL" => Ok(xr::ReferenceSpaceType::LOCAL),
        "XR_REFERENCE_SPACE_TYPE_STAGE" => Ok(xr::ReferenceSpaceType::STAGE),
        _ => Err(UnknownName {
            name: name.to_owned(),
            enum_name: "XrReferenceSpaceType",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command> {
        Options::from_vec(args.iter().map(OsString::from).collect())
    }

    fn run_options(args: &[&str]) -> Options {
        match parse(args).unwrap() {
            Command::Run(options) => options,
            Command::Help => panic!("expected options, got help"),
        }
    }

    #[test]
    fn no_arguments_gives_defaults() {
        assert_eq!(run_options(&[]), Options::default());
        let defaults = Options::default();
        assert_eq!(defaults.form_factor, xr::FormFactor::HEAD_MOUNTED_DISPLAY);
        assert_eq!(defaults.view_type, xr::ViewConfigurationType::PRIMARY_STEREO);
        assert_eq!(defaults.play_space_type, xr::ReferenceSpaceType::LOCAL);
        assert!(defaults.query_hand_velocities);
        assert!(!defaults.query_joint_velocities);
    }

    #[test]
    fn help_wins_over_everything_else() {
        assert_eq!(parse(&["--joint_velocities", "-h"]).unwrap(), Command::Help);
        assert_eq!(parse(&["--help"]).unwrap(), Command::Help);
    }

    #[test]
    fn enum_names_are_parsed() {
        let options = run_options(&[
            "--form_factor",
            "XR_FORM_FACTOR_HANDHELD_DISPLAY",
            "--view_type",
            "XR_VIEW_CONFIGURATION_TYPE_PRIMARY_MONO",
            "--play_space_type",
            "XR_REFERENCE_SPACE_TYPE_STAGE",
        ]);
        assert_eq!(options.form_factor, xr::FormFactor::HANDHELD_DISPLAY);
        assert_eq!(options.view_type, xr::ViewConfigurationType::PRIMARY_MONO);
        assert_eq!(options.play_space_type, xr::ReferenceSpaceType::STAGE);
    }

    #[test]
    fn flags_are_parsed() {
        let options = run_options(&[
            "--joint_velocities",
            "--no_hand_velocities",
            "--desktop",
            "--refresh_rate",
            "90",
        ]);
        assert!(options.query_joint_velocities);
        assert!(!options.query_hand_velocities);
        assert!(options.desktop);
        assert_eq!(options.refresh_rate, Some(90.0));
    }

    #[test]
    fn unknown_enum_name_is_rejected() {
        assert!(parse(&["--play_space_type", "XR_REFERENCE_SPACE_TYPE_MOON"]).is_err());
        assert!(parse_form_factor("HEAD_MOUNTED_DISPLAY").is_err());
    }

    #[test]
    fn leftover_arguments_are_rejected() {
        assert!(parse(&["--frobnicate"]).is_err());
    }

    #[test]
    fn non_positive_refresh_rate_is_rejected() {
        assert!(parse(&["--refresh_rate", "0"]).is_err());
        assert!(parse(&["--refresh_rate", "-72"]).is_err());
    }
}
