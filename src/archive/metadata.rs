//! JAR manifest (`META-INF/MANIFEST.MF`) text format.

const MAX_LINE_BYTES: usize = 72;
const VERSION_KEY: &str = "Manifest-Version";
const DEFAULT_VERSION: &str = "1.0";

/// One attribute block. Per-entry sections start with `Name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSection {
    attributes: Vec<(String, String)>,
}

impl ManifestSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replace a same-named attribute in place, or append.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Archive-level metadata: main attributes plus per-entry sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub main: ManifestSection,
    pub sections: Vec<ManifestSection>,
}

impl ArchiveMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.main.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.main.get(key)
    }

    /// Lenient parse: lines without a `:` separator are skipped.
    pub fn parse(text: &str) -> Self {
        let mut metadata = ArchiveMetadata::default();
        let mut current = ManifestSection::default();
        let mut in_main = true;

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                metadata.close_section(std::mem::take(&mut current), &mut in_main);
                continue;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.attributes.last_mut() {
                    value.push_str(rest);
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                current
                    .attributes
                    .push((key.trim().to_string(), value.to_string()));
            }
        }
        metadata.close_section(current, &mut in_main);
        metadata
    }

    fn close_section(&mut self, section: ManifestSection, in_main: &mut bool) {
        if *in_main {
            self.main = section;
            *in_main = false;
        } else if !section.is_empty() {
            self.sections.push(section);
        }
    }

    /// `self` with every attribute of `base` applied on top.
    pub fn merged(&self, base: &ArchiveMetadata) -> ArchiveMetadata {
        let mut merged = self.clone();
        for (key, value) in base.main.iter() {
            merged.main.set(key, value);
        }
        merged.sections.extend(base.sections.iter().cloned());
        merged
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let version = self.main.get(VERSION_KEY).unwrap_or(DEFAULT_VERSION);
        write_attribute(&mut out, VERSION_KEY, version);
        for (key, value) in self.main.iter() {
            if !key.eq_ignore_ascii_case(VERSION_KEY) {
                write_attribute(&mut out, key, value);
            }
        }
        out.push_str("\r\n");
        for section in &self.sections {
            for (key, value) in section.iter() {
                write_attribute(&mut out, key, value);
            }
            out.push_str("\r\n");
        }
        out
    }
}

/// Emit `key: value`, wrapping at 72 bytes with single-space continuations.
fn write_attribute(out: &mut String, key: &str, value: &str) {
    let line = format!("{}: {}", key, value);
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_BYTES;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        limit = MAX_LINE_BYTES - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_main_and_sections() {
        let text = "Manifest-Version: 1.0\r\nMain-Class: net.minecraft.server.Main\r\n\r\nName: a/B.class\r\nSHA-256-Digest: abc\r\n\r\n";
        let md = ArchiveMetadata::parse(text);
        assert_eq!(md.get("main-class"), Some("net.minecraft.server.Main"));
        assert_eq!(md.sections.len(), 1);
        assert_eq!(md.sections[0].get("Name"), Some("a/B.class"));
    }

    #[test]
    fn test_continuation_lines_joined() {
        let text = "Manifest-Version: 1.0\nClass-Path: libs/one.jar libs/tw\n o.jar\n";
        let md = ArchiveMetadata::parse(text);
        assert_eq!(md.get("Class-Path"), Some("libs/one.jar libs/two.jar"));
    }

    #[test]
    fn test_render_defaults_version_first() {
        let md = ArchiveMetadata::new().with("Created-By", "jar-patcher");
        assert_eq!(
            md.render(),
            "Manifest-Version: 1.0\r\nCreated-By: jar-patcher\r\n\r\n"
        );
    }

    #[test]
    fn test_long_values_wrap_and_parse_back() {
        let value = "x".repeat(200);
        let md = ArchiveMetadata::new().with("Class-Path", value.clone());
        let text = md.render();
        assert!(text.split("\r\n").all(|line| line.len() <= 72));
        assert_eq!(ArchiveMetadata::parse(&text).get("Class-Path"), Some(value.as_str()));
    }

    #[test]
    fn test_wrap_respects_char_boundaries() {
        let value = "é".repeat(60);
        let text = ArchiveMetadata::new().with("Title", value.clone()).render();
        assert_eq!(ArchiveMetadata::parse(&text).get("Title"), Some(value.as_str()));
    }

    #[test]
    fn test_base_overrides_same_named() {
        let source = ArchiveMetadata::new()
            .with("Main-Class", "a.Main")
            .with("Created-By", "javac");
        let base = ArchiveMetadata::new().with("created-by", "jar-patcher 0.1.0");
        let merged = source.merged(&base);
        assert_eq!(merged.get("Created-By"), Some("jar-patcher 0.1.0"));
        assert_eq!(merged.get("Main-Class"), Some("a.Main"));
        assert_eq!(merged.main.iter().count(), 2);
    }
}
