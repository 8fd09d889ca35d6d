//! Information about the running architecture, used to pick driver variants.

/// Operating system and pointer width of the running binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchInfo {
    pub os: String,
    pub bitness: String,
}

impl ArchInfo {
    pub fn new(os: impl Into<String>, bitness: impl Into<String>) -> Self {
        ArchInfo {
            os: os.into(),
            bitness: bitness.into(),
        }
    }

    /// Architecture of the running binary.
    pub fn current() -> Self {
        let bitness = if usize::BITS > 32 { "64" } else { "32" };
        ArchInfo::new(std::env::consts::OS, bitness)
    }

    /// Suffix of architecture specific driver files, e.g. `linux_64`.
    pub fn suffix(&self) -> String {
        format!("{}_{}", self.os, self.bitness)
    }

    /// Flags a driver may declare to state which architectures it supports.
    pub fn compatibility_flags(&self) -> Vec<String> {
        vec![
            "any".to_string(),
            format!("any-{}", self.bitness),
            format!("{}-any", self.os),
            format!("{}-{}", self.os, self.bitness),
        ]
    }

    /// Whether any of `flags` matches this architecture. No flags means "any".
    pub fn is_compatible(&self, flags: &[String]) -> bool {
        if flags.is_empty() {
            return true;
        }
        let own = self.compatibility_flags();
        flags.iter().any(|flag| own.contains(flag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix() {
        assert_eq!(ArchInfo::new("windows", "32").suffix(), "windows_32");
    }

    #[test]
    fn test_compatibility_flags() {
        let arch = ArchInfo::new("linux", "64");
        assert_eq!(
            arch.compatibility_flags(),
            vec!["any", "any-64", "linux-any", "linux-64"]
        );
    }

    #[test]
    fn test_is_compatible() {
        let arch = ArchInfo::new("linux", "64");
        assert!(arch.is_compatible(&[]));
        assert!(arch.is_compatible(&["any-64".to_string()]));
        assert!(!arch.is_compatible(&["windows-any".to_string(), "any-32".to_string()]));
    }

    #[test]
    fn test_current_matches_pointer_width() {
        let arch = ArchInfo::current();
        assert_eq!(arch.os, std::env::consts::OS);
        assert_eq!(arch.bitness, (usize::BITS.min(64)).to_string());
    }
}
