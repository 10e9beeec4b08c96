//! Printing the generated helper script.

use obi_common::runner::ScriptWriter;
use std::io::Write;

/// Write `$ cat <script>` followed by the recorded commands.
pub fn print(script: &ScriptWriter, out: &mut impl Write) -> anyhow::Result<()> {
    writeln!(out, "$ cat {}", script.path().display())?;
    for command in script.commands()? {
        writeln!(out, "{command}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_print_lists_recorded_commands() {
        let tmp = TempDir::new().unwrap();
        let script = ScriptWriter::create(tmp.path(), "build", "localhost").unwrap();
        script.append("mkdir -p build").unwrap();
        script.append("cmake --build build").unwrap();

        let mut out = Vec::new();
        print(&script, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header = format!("$ cat {}", script.path().display());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                header.as_str(),
                "mkdir -p build",
                "cmake --build build",
            ]
        );
    }
}
