//! End-to-end `create-image` against a project on disk
//!
//! The build command is a shell one-liner that drops a fake binary and ELF
//! into the target's bin directory.
#![cfg(unix)]

use std::fs;
use std::path::Path;

use base64::Engine;
use ed25519_dalek::{Signature, SigningKey, Verifier};
use fwpipe::config::{ImageFormat, ImageOptions};
use fwpipe::{
    ConsolePrompt, CreateImageCommand, FileImageProducer, LocalProject, Pipeline, PipelineError,
    Stage,
};
use fwpipe_image::header::FLAG_ENCRYPTED;
use fwpipe_image::tlv::{TLV_ED25519, TLV_KEYHASH, TLV_SECRET_ID, TLV_SHA256};
use fwpipe_image::{parse_image, ImageError, ImageManifest, ImageVersion, ParsedHeader};
use tempfile::TempDir;

const BODY: &[u8] = b"firmware-body";

fn write(path: &Path, content: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup(slot_size: Option<u64>) -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("project.toml"),
        r#"
[project]
name = "demo"

[commands]
build = ["sh", "-c", "mkdir -p \"$FWPIPE_BIN_DIR\" && printf firmware-body > \"$FWPIPE_BIN\" && : > \"$FWPIPE_ELF\""]
"#,
    );
    let slot = slot_size
        .map(|s| format!("image_slot_size = {}\n", s))
        .unwrap_or_default();
    write(
        &dir.path().join("targets/t1/target.toml"),
        format!("app = \"apps/blinky\"\nbsp = \"hw/bsp/nrf52dk\"\n{}", slot),
    );
    fs::create_dir_all(dir.path().join("apps/blinky")).unwrap();
    dir
}

fn pipeline(dir: &TempDir) -> Pipeline<LocalProject, FileImageProducer, ConsolePrompt> {
    let project = LocalProject::open(dir.path()).unwrap();
    Pipeline::new(project, FileImageProducer::new(), ConsolePrompt)
}

fn command(version: &str, keys: Vec<String>, options: ImageOptions) -> CreateImageCommand {
    CreateImageCommand {
        target: "t1".to_string(),
        version: version.to_string(),
        key_args: keys,
        options,
    }
}

fn write_key(dir: &Path, name: &str, seed: [u8; 32]) -> String {
    let path = dir.join(name);
    fs::write(&path, base64::engine::general_purpose::STANDARD.encode(seed)).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_signed_current_image() {
    let dir = setup(None);
    let seed = [9u8; 32];
    let key = write_key(dir.path(), "sign.key", seed);

    let image = pipeline(&dir)
        .create_image(&command("1.3.0.3", vec![key], ImageOptions::default()))
        .unwrap();
    assert_eq!(image.path, dir.path().join("bin/t1/blinky.img"));

    let bytes = fs::read(&image.path).unwrap();
    assert_eq!(image.size, bytes.len());
    let parsed = parse_image(&bytes).unwrap();
    assert!(matches!(parsed.header, ParsedHeader::V2(_)));
    assert_eq!(parsed.version(), ImageVersion::new(1, 3, 0, 3));
    assert_eq!(parsed.body, BODY);

    let hash = &parsed.find_tlv(TLV_SHA256).unwrap().data;
    assert_eq!(hex::encode(hash), image.hash);
    assert_eq!(parsed.tlvs_of(TLV_KEYHASH).len(), 1);

    let sig = &parsed.find_tlv(TLV_ED25519).unwrap().data;
    let sig = Signature::from_slice(sig).unwrap();
    SigningKey::from_bytes(&seed)
        .verifying_key()
        .verify(hash, &sig)
        .unwrap();

    let manifest = ImageManifest::from_file(&image.manifest_path).unwrap();
    assert_eq!(manifest.target, "t1");
    assert_eq!(manifest.name, "blinky");
    assert_eq!(manifest.format, "v2");
    assert_eq!(manifest.version, ImageVersion::new(1, 3, 0, 3));
    assert_eq!(manifest.key_hashes.len(), 1);
    assert_eq!(manifest.key_id, None);
    assert!(!manifest.encrypted);
}

#[test]
fn test_legacy_image_records_key_id() {
    let dir = setup(None);
    let key = write_key(dir.path(), "sign.key", [3u8; 32]);

    let options = ImageOptions {
        format: ImageFormat::Legacy,
        ..Default::default()
    };
    let image = pipeline(&dir)
        .create_image(&command("2.0", vec![key, "7".to_string()], options))
        .unwrap();

    let parsed = parse_image(&fs::read(&image.path).unwrap()).unwrap();
    match parsed.header {
        ParsedHeader::V1(header) => assert_eq!(header.key_id, 7),
        other => panic!("expected legacy header, got {:?}", other),
    }

    let manifest = ImageManifest::from_file(&image.manifest_path).unwrap();
    assert_eq!(manifest.format, "v1");
    assert_eq!(manifest.key_id, Some(7));
}

#[test]
fn test_hardware_key_encryption() {
    let dir = setup(None);
    let aes = dir.path().join("aes.key");
    fs::write(&aes, [0x42u8; 16]).unwrap();

    let options = ImageOptions {
        encrypt_key: Some(aes),
        hw_key_index: Some(2),
        ..Default::default()
    };
    let image = pipeline(&dir)
        .create_image(&command("1.0", Vec::new(), options))
        .unwrap();

    let parsed = parse_image(&fs::read(&image.path).unwrap()).unwrap();
    assert_ne!(parsed.flags() & FLAG_ENCRYPTED, 0);
    assert_ne!(parsed.body, BODY);
    assert_eq!(
        parsed.find_tlv(TLV_SECRET_ID).unwrap().data,
        2u32.to_le_bytes().to_vec()
    );
    assert!(ImageManifest::from_file(&image.manifest_path).unwrap().encrypted);
}

#[test]
fn test_flash_overflow_rejected_unless_forced() {
    let dir = setup(Some(16));

    let err = pipeline(&dir)
        .create_image(&command("1.0", Vec::new(), ImageOptions::default()))
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Image);
    assert!(matches!(
        err,
        PipelineError::Image(ImageError::FlashOverflow { slot_size: 16, .. })
    ));
    assert!(!dir.path().join("bin/t1/blinky.img").exists());

    let forced = ImageOptions {
        force: true,
        ..Default::default()
    };
    let image = pipeline(&dir)
        .create_image(&command("1.0", Vec::new(), forced))
        .unwrap();
    assert!(image.size > 16);
}

#[test]
fn test_legacy_sections_rejected() {
    let dir = setup(None);
    let options = ImageOptions {
        format: ImageFormat::Legacy,
        sections: vec![".ver".to_string()],
        ..Default::default()
    };
    let err = pipeline(&dir)
        .create_image(&command("1.0", Vec::new(), options))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Image(ImageError::SectionsUnsupported)
    ));
}

#[test]
fn test_malformed_key_file() {
    let dir = setup(None);
    let bad = dir.path().join("bad.key");
    fs::write(&bad, "not a key").unwrap();

    let err = pipeline(&dir)
        .create_image(&command(
            "1.0",
            vec![bad.to_string_lossy().into_owned()],
            ImageOptions::default(),
        ))
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Keys);
    // build ran, image did not
    assert!(dir.path().join("bin/t1/blinky.elf").exists());
    assert!(!dir.path().join("bin/t1/blinky.img").exists());
}

#[test]
fn test_missing_build_command() {
    let dir = setup(None);
    write(&dir.path().join("project.toml"), "[project]\nname = \"demo\"\n");

    let err = pipeline(&dir)
        .create_image(&command("1.0", Vec::new(), ImageOptions::default()))
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Build);
}
