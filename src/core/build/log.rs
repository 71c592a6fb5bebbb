use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::BuildError;

static COPYING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Copying ([a-zA-Z0-9_]+\.[a-zA-Z0-9]+) to qmk_firmware folder")
        .expect("copying pattern is valid")
});
// Older QMK releases only announce the file while checking its size.
static CHECKING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Checking file size of ([a-zA-Z0-9_]+\.[a-zA-Z0-9]+)")
        .expect("checking pattern is valid")
});

/// Find the produced firmware file name (`<name>.<ext>`) in compiler stdout.
pub fn extract_artifact_name(stdout: &str) -> Result<String, BuildError> {
    COPYING_LINE
        .captures(stdout)
        .or_else(|| CHECKING_LINE.captures(stdout))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            BuildError::NotFound("the firmware file name in the compiler output".to_string())
        })
}

/// `name.ext` becomes `name_<unix seconds>.ext`; a name without an extension
/// gets the suffix at the end. An empty name stays empty.
pub fn timestamped_file_name(name: &str, unix_secs: u64) -> String {
    if name.is_empty() {
        return String::new();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{}.{}", stem, unix_secs, ext),
        None => format!("{}_{}", name, unix_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_copied_artifact() {
        let stdout = "Compiling keymap with gmake...\n\
            Linking: .build/kb1_remap.elf [OK]\n\
            Creating hex file: .build/kb1_remap.hex [OK]\n\
            Copying kb1_remap.hex to qmk_firmware folder [OK]\n\
            Checking file size of kb1_remap.hex [OK]\n";
        assert_eq!(extract_artifact_name(stdout).unwrap(), "kb1_remap.hex");
    }

    #[test]
    fn falls_back_to_size_check_line() {
        let stdout = "Creating UF2 file for deployment: .build/kb1_remap.uf2 [OK]\n\
            Checking file size of kb1_remap.uf2 [OK]\n";
        assert_eq!(extract_artifact_name(stdout).unwrap(), "kb1_remap.uf2");
    }

    #[test]
    fn copying_line_wins_over_size_check() {
        let stdout = "Checking file size of first.bin\nCopying second.hex to qmk_firmware folder\n";
        assert_eq!(extract_artifact_name(stdout).unwrap(), "second.hex");
    }

    #[test]
    fn no_artifact_line_is_not_found() {
        let result = extract_artifact_name("make: *** [kb1] Error 1\n");
        assert!(matches!(result, Err(BuildError::NotFound(_))));
        assert!(matches!(extract_artifact_name(""), Err(BuildError::NotFound(_))));
    }

    #[test]
    fn timestamp_goes_before_the_extension() {
        assert_eq!(
            timestamped_file_name("kb1_remap.hex", 1_700_000_000),
            "kb1_remap_1700000000.hex"
        );
        assert_eq!(timestamped_file_name("a.b.bin", 5), "a.b_5.bin");
        assert_eq!(timestamped_file_name("firmware", 5), "firmware_5");
        assert_eq!(timestamped_file_name("", 5), "");
    }
}
