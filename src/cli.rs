//! Command-line surface
//!
//! Parsed with clap and converted once into the immutable option values the
//! pipeline consumes.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use fwpipe_image::parse_section_list;
use tracing::warn;

use crate::config::{ImageFormat, ImageOptions, OptionsError, RunOptions};
use crate::pipeline::{CreateImageCommand, RunCommand};

/// Printed by the obsolete `resign-image` command
pub const RESIGN_IMAGE_GUIDANCE: &str =
    "This command is obsolete; use the `larva` tool to resign images.";

#[derive(Parser, Debug)]
#[command(name = "fwpipe")]
#[command(about = "Build, version, sign and deploy firmware images", version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Project root (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add image header to target binary
    #[command(after_help = "Examples:
  fwpipe create-image my_target1 1.3.0
  fwpipe create-image my_target1 1.3.0.3 private.pem
  fwpipe create-image -1 my_target1 1.3.0.3 private.pem 2
  fwpipe create-image -2 my_target1 timestamp private-1.pem private-2.pem
  fwpipe create-image my_target1 1.3.0.3 -H 3 -e aes_key")]
    CreateImage {
        /// Target to build
        target: String,

        /// Image version (major.minor.rev.build), or "timestamp"
        #[arg(id = "image_version", value_name = "VERSION")]
        version: String,

        /// Signing key files; legacy format takes one key and an optional key id
        keys: Vec<String>,

        #[command(flatten)]
        flags: ImageFlags,
    },

    /// build/create-image/download/debug <target>
    Run {
        /// Target or unit-test package
        target: String,

        /// Image version, or "timestamp"; prompted for when omitted
        #[arg(id = "image_version", value_name = "VERSION")]
        version: Option<String>,

        /// Signing key files
        keys: Vec<String>,

        #[command(flatten)]
        flags: ImageFlags,

        /// Extra commands to send to JTAG software
        #[arg(long = "extrajtagcmd")]
        extra_jtag_cmd: Option<String>,

        /// Do not start GDB from command line
        #[arg(short = 'n', long = "noGDB")]
        no_gdb: bool,
    },

    /// Obsolete
    ResignImage {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
        args: Vec<String>,
    },
}

/// Flags shared by `create-image` and `run`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFlags {
    /// Use old image header format
    #[arg(short = '1', long = "legacy", visible_alias = "v1")]
    pub legacy: bool,

    /// Use new image header format (default)
    #[arg(short = '2', long = "current", visible_alias = "v2")]
    pub current: bool,

    /// Use RSA-PSS instead of PKCS#1 v1.5 for RSA signatures
    #[arg(long)]
    pub rsa_pss: bool,

    /// Encrypt image using this key
    #[arg(short = 'e', long = "encrypt")]
    pub encrypt: Option<PathBuf>,

    /// Hardware stored key index
    #[arg(
        short = 'H',
        long = "hw-stored-key",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    pub hw_stored_key: i64,

    /// Pad header to this length
    #[arg(short = 'p', long, default_value_t = 0)]
    pub pad_header: u32,

    /// Pad image to this length
    #[arg(short = 'i', long, default_value_t = 0)]
    pub pad_image: u32,

    /// Section names for TLVs, comma delimited
    #[arg(short = 'S', long)]
    pub sections: Option<String>,

    /// Use legacy TLV values for NONCE and SECRET_ID
    #[arg(short = 'L', long)]
    pub legacy_tlvs: bool,

    /// Overwrite binary image source
    #[arg(short = 'W', long)]
    pub overwrite_src: Option<PathBuf>,

    /// Ignore flash overflow errors during image creation
    #[arg(short = 'f', long)]
    pub force: bool,
}

impl ImageFlags {
    pub fn to_options(&self) -> Result<ImageOptions, OptionsError> {
        let format = ImageFormat::from_flags(self.legacy, self.current)?;

        let overwrite_src = match (&self.overwrite_src, format) {
            (Some(path), ImageFormat::Legacy) => {
                warn!(path = %path.display(), "--overwrite-src applies to the current format only; ignored");
                None
            }
            (src, _) => src.clone(),
        };

        Ok(ImageOptions {
            format,
            rsa_pss: self.rsa_pss,
            encrypt_key: self.encrypt.clone(),
            hw_key_index: ImageOptions::hw_key_index_from_flag(self.hw_stored_key)?,
            pad_header: self.pad_header,
            pad_image: self.pad_image,
            sections: self
                .sections
                .as_deref()
                .map(parse_section_list)
                .unwrap_or_default(),
            legacy_tlvs: self.legacy_tlvs,
            overwrite_src,
            force: self.force,
        })
    }
}

impl CreateImageCommand {
    pub fn from_args(
        target: String,
        version: String,
        keys: Vec<String>,
        flags: &ImageFlags,
    ) -> Result<Self, OptionsError> {
        Ok(Self {
            target,
            version,
            key_args: keys,
            options: flags.to_options()?,
        })
    }
}

impl RunCommand {
    pub fn from_args(
        target: String,
        version: Option<String>,
        keys: Vec<String>,
        flags: &ImageFlags,
        extra_jtag_cmd: Option<String>,
        no_gdb: bool,
    ) -> Result<Self, OptionsError> {
        let mut image = flags.to_options()?;
        // run always packages the freshly built binary
        image.overwrite_src = None;

        Ok(Self {
            target,
            version,
            key_args: keys,
            options: RunOptions {
                image,
                extra_jtag_cmd: extra_jtag_cmd.filter(|s| !s.is_empty()),
                no_gdb,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fwpipe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_create_image_positionals() {
        let cli = parse(&["create-image", "t1", "1.3.0.3", "a.pem", "b.pem"]);
        match cli.command {
            Commands::CreateImage {
                target,
                version,
                keys,
                flags,
            } => {
                assert_eq!(target, "t1");
                assert_eq!(version, "1.3.0.3");
                assert_eq!(keys, vec!["a.pem", "b.pem"]);
                assert_eq!(flags, ImageFlags { hw_stored_key: -1, ..Default::default() });
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_create_image_requires_version() {
        assert!(Cli::try_parse_from(["fwpipe", "create-image", "t1"]).is_err());
        assert!(Cli::try_parse_from(["fwpipe", "create-image"]).is_err());
    }

    #[test]
    fn test_create_image_flags() {
        let cli = parse(&[
            "create-image",
            "-1",
            "--rsa-pss",
            "-e",
            "aes.key",
            "--hw-stored-key=3",
            "-p",
            "64",
            "-i",
            "512",
            "-S",
            "ver, .sig_data ,",
            "-L",
            "-f",
            "t1",
            "timestamp",
        ]);
        let Commands::CreateImage { flags, .. } = cli.command else {
            panic!("expected create-image");
        };
        let opts = flags.to_options().unwrap();
        assert_eq!(opts.format, ImageFormat::Legacy);
        assert!(opts.rsa_pss);
        assert_eq!(opts.encrypt_key, Some(PathBuf::from("aes.key")));
        assert_eq!(opts.hw_key_index, Some(3));
        assert_eq!(opts.pad_header, 64);
        assert_eq!(opts.pad_image, 512);
        assert_eq!(opts.sections, vec!["ver", ".sig_data"]);
        assert!(opts.legacy_tlvs);
        assert!(opts.force);
    }

    #[test]
    fn test_negative_hw_key_is_unset() {
        let cli = parse(&["create-image", "--hw-stored-key=-1", "t1", "1.0"]);
        let Commands::CreateImage { flags, .. } = cli.command else {
            panic!("expected create-image");
        };
        assert_eq!(flags.hw_stored_key, -1);
        assert_eq!(flags.to_options().unwrap().hw_key_index, None);
    }

    #[test]
    fn test_oversized_hw_key_rejected() {
        let cli = parse(&[
            "create-image",
            "--hw-stored-key=4294967296",
            "-e",
            "aes.key",
            "t1",
            "1.0",
        ]);
        let Commands::CreateImage { flags, .. } = cli.command else {
            panic!("expected create-image");
        };
        assert_eq!(
            flags.to_options(),
            Err(OptionsError::HwKeyIndexOutOfRange(4294967296))
        );
    }

    #[test]
    fn test_both_formats_rejected() {
        let cli = parse(&["create-image", "-1", "-2", "t1", "1.0"]);
        let Commands::CreateImage { flags, .. } = cli.command else {
            panic!("expected create-image");
        };
        assert_eq!(flags.to_options(), Err(OptionsError::ConflictingFormats));
    }

    #[test]
    fn test_format_aliases() {
        let cli = parse(&["create-image", "--v1", "t1", "1.0"]);
        let Commands::CreateImage { flags, .. } = cli.command else {
            panic!("expected create-image");
        };
        assert!(flags.legacy);

        let cli = parse(&["create-image", "--current", "t1", "1.0"]);
        let Commands::CreateImage { flags, .. } = cli.command else {
            panic!("expected create-image");
        };
        assert!(flags.current);
    }

    #[test]
    fn test_overwrite_src_dropped_for_legacy() {
        let flags = ImageFlags {
            legacy: true,
            overwrite_src: Some(PathBuf::from("other.bin")),
            hw_stored_key: -1,
            ..Default::default()
        };
        assert_eq!(flags.to_options().unwrap().overwrite_src, None);

        let flags = ImageFlags {
            overwrite_src: Some(PathBuf::from("other.bin")),
            hw_stored_key: -1,
            ..Default::default()
        };
        assert_eq!(
            flags.to_options().unwrap().overwrite_src,
            Some(PathBuf::from("other.bin"))
        );
    }

    #[test]
    fn test_run_optional_version() {
        let cli = parse(&["run", "t1"]);
        match cli.command {
            Commands::Run {
                target,
                version,
                keys,
                no_gdb,
                extra_jtag_cmd,
                ..
            } => {
                assert_eq!(target, "t1");
                assert!(version.is_none());
                assert!(keys.is_empty());
                assert!(!no_gdb);
                assert!(extra_jtag_cmd.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_flags() {
        let cli = parse(&[
            "-vv",
            "run",
            "--extrajtagcmd",
            "adapter speed 1000",
            "-n",
            "-W",
            "other.bin",
            "t1",
            "1.2",
            "k.pem",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Run {
            target,
            version,
            keys,
            flags,
            extra_jtag_cmd,
            no_gdb,
        } = cli.command
        else {
            panic!("expected run");
        };

        let cmd = RunCommand::from_args(target, version, keys, &flags, extra_jtag_cmd, no_gdb).unwrap();
        assert_eq!(cmd.version.as_deref(), Some("1.2"));
        assert_eq!(cmd.key_args, vec!["k.pem"]);
        assert_eq!(cmd.options.extra_jtag_cmd.as_deref(), Some("adapter speed 1000"));
        assert!(cmd.options.no_gdb);
        assert_eq!(cmd.options.image.overwrite_src, None);
    }

    #[test]
    fn test_global_project_flag() {
        let cli = parse(&["create-image", "t1", "1.0", "--project", "/work/proj"]);
        assert_eq!(cli.project, Some(PathBuf::from("/work/proj")));
    }

    #[test]
    fn test_resign_image_accepts_anything() {
        let cli = parse(&["resign-image", "img.bin", "-k", "key.pem"]);
        assert!(matches!(cli.command, Commands::ResignImage { .. }));
    }
}
