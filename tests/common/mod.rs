//! Shared fixtures: a hand-assembled slime class, archives and plugin packages.

#![allow(dead_code)]

use jar_patcher::{Archive, ArchiveMetadata, Settings};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const SLIME_ENTRY: &str = "net/minecraft/server/EntitySlime.class";
pub const SLIME_NAME: &str = "net.minecraft.server.EntitySlime";
pub const SPAWN_RULE_ENTRY_POINT: &str = "builtin:slime-spawn-rules";

fn u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn utf8(out: &mut Vec<u8>, s: &str) {
    out.push(1);
    u2(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

fn attribute(out: &mut Vec<u8>, name_index: u16, info: &[u8]) {
    u2(out, name_index);
    u4(out, info.len() as u32);
    out.extend_from_slice(info);
}

fn code_attribute(
    max_stack: u16,
    max_locals: u16,
    code: &[u8],
    attributes: &[(u16, Vec<u8>)],
) -> Vec<u8> {
    let mut info = Vec::new();
    u2(&mut info, max_stack);
    u2(&mut info, max_locals);
    u4(&mut info, code.len() as u32);
    info.extend_from_slice(code);
    u2(&mut info, 0);
    u2(&mut info, attributes.len() as u16);
    for (name, body) in attributes {
        attribute(&mut info, *name, body);
    }
    info
}

fn method(out: &mut Vec<u8>, access: u16, name: u16, descriptor: u16, code: Vec<u8>) {
    u2(out, access);
    u2(out, name);
    u2(out, descriptor);
    u2(out, 1);
    attribute(out, 13, &code);
}

/// Byte code of `checkSpawnRules(Random, int)`:
///
/// ```text
///  0 aload_0
///  1 bipush 8
///  3 invokevirtual java/util/Random.nextInt(I)I
///  6 ifne 11
///  9 iconst_0
/// 10 ireturn
/// 11 iload_1
/// 12 bipush 10
/// 14 if_icmpge 19
/// 17 iconst_1
/// 18 ireturn
/// 19 iconst_0
/// 20 ireturn
/// ```
pub const SPAWN_RULES_CODE: [u8; 21] = [
    0x2A, 0x10, 0x08, 0xB6, 0x00, 0x0A, 0x9A, 0x00, 0x05, 0x03, 0xAC, 0x1B, 0x10, 0x0A, 0xA2,
    0x00, 0x05, 0x04, 0xAC, 0x03, 0xAC,
];

/// Class `net/minecraft/server/EntitySlime` with methods
/// `static checkSpawnRules(Ljava/util/Random;I)Z`, `size()I` and `isTiny()Z`.
/// With `static_is_tiny`, `isTiny` is static too, which makes the spawn
/// rule method ambiguous.
pub fn slime_class(static_is_tiny: bool) -> Vec<u8> {
    let mut out = Vec::new();
    u4(&mut out, 0xCAFE_BABE);
    u2(&mut out, 0);
    u2(&mut out, 52);

    u2(&mut out, 22);
    utf8(&mut out, "net/minecraft/server/EntitySlime"); // 1
    out.push(7); // 2
    u2(&mut out, 1);
    utf8(&mut out, "java/lang/Object"); // 3
    out.push(7); // 4
    u2(&mut out, 3);
    utf8(&mut out, "java/util/Random"); // 5
    out.push(7); // 6
    u2(&mut out, 5);
    utf8(&mut out, "nextInt"); // 7
    utf8(&mut out, "(I)I"); // 8
    out.push(12); // 9
    u2(&mut out, 7);
    u2(&mut out, 8);
    out.push(10); // 10
    u2(&mut out, 6);
    u2(&mut out, 9);
    utf8(&mut out, "checkSpawnRules"); // 11
    utf8(&mut out, "(Ljava/util/Random;I)Z"); // 12
    utf8(&mut out, "Code"); // 13
    utf8(&mut out, "size"); // 14
    utf8(&mut out, "()I"); // 15
    utf8(&mut out, "StackMapTable"); // 16
    utf8(&mut out, "LineNumberTable"); // 17
    out.push(5); // 18, 19
    out.extend_from_slice(&42i64.to_be_bytes());
    utf8(&mut out, "isTiny"); // 20
    utf8(&mut out, "()Z"); // 21

    u2(&mut out, 0x0021);
    u2(&mut out, 2);
    u2(&mut out, 4);
    u2(&mut out, 0);
    u2(&mut out, 0);

    u2(&mut out, 3);

    // Frames at 11 and 19; line numbers at 0, 11, 19.
    let frames = vec![0x00, 0x02, 11, 7];
    let mut lines = Vec::new();
    u2(&mut lines, 3);
    for (start, line) in [(0u16, 10u16), (11, 12), (19, 14)] {
        u2(&mut lines, start);
        u2(&mut lines, line);
    }
    method(
        &mut out,
        0x0009,
        11,
        12,
        code_attribute(2, 2, &SPAWN_RULES_CODE, &[(16, frames), (17, lines)]),
    );
    method(&mut out, 0x0001, 14, 15, code_attribute(1, 1, &[0x05, 0xAC], &[]));
    let (access, locals) = if static_is_tiny { (0x0009, 0) } else { (0x0001, 1) };
    method(&mut out, access, 20, 21, code_attribute(1, locals, &[0x04, 0xAC], &[]));

    u2(&mut out, 0);
    out
}

/// Write a zip with the given entries through the crate's own writer.
pub fn write_archive(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut archive = Archive::new();
    for (name, bytes) in entries {
        archive.insert(*name, bytes.clone());
    }
    archive
        .write(path, &ArchiveMetadata::new().with("Main-Class", "net.minecraft.server.Main"))
        .unwrap();
}

/// Plugin package with an optional `manifest.json`.
pub fn write_plugin(dir: &Path, file: &str, manifest: Option<&str>) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file);
    let mut zip = zip::ZipWriter::new(fs::File::create(&path).unwrap());
    if let Some(json) = manifest {
        zip.start_file("manifest.json", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(json.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

pub fn manifest_json(name: &str, entry_point: &str) -> String {
    format!(
        r#"{{"name": "{}", "version": "1.0.0", "author": "tests", "entry_point": "{}"}}"#,
        name, entry_point
    )
}

/// A scratch workspace with absolute paths for every setting.
pub struct Workspace {
    pub dir: TempDir,
    pub settings: Settings,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.paths.source = dir.path().join("server.jar");
        settings.paths.plugins = dir.path().join("wrapper-plugins");
        settings.paths.cache = dir.path().join("cache");
        settings.paths.dump = dir.path().join("dump");
        Self { dir, settings }
    }

    /// Source archive holding the slime class, an unrelated class and a
    /// version record.
    pub fn with_server_jar(self) -> Self {
        write_archive(
            &self.settings.paths.source,
            &[
                ("net/", vec![]),
                ("net/minecraft/", vec![]),
                ("net/minecraft/server/", vec![]),
                (SLIME_ENTRY, slime_class(false)),
                ("version.json", br#"{"id": "1.8.8", "name": "1.8.8"}"#.to_vec()),
                ("assets/lang/en_US.lang", b"entity.Slime.name=Slime".to_vec()),
            ],
        );
        self
    }

    pub fn plugin(&self, file: &str, manifest: Option<&str>) -> PathBuf {
        write_plugin(&self.settings.paths.plugins, file, manifest)
    }

    pub fn artifact(&self) -> PathBuf {
        self.settings.artifact_path()
    }

    pub fn digest_file(&self) -> PathBuf {
        self.settings
            .paths
            .cache
            .join(format!("plugins.{}", self.settings.build.digest.name()))
    }
}
