//! `obi room list`.

use obi_common::ProjectConfig;
use std::io::Write;

/// Write the project's room names, one per line, in sorted order.
pub fn list(project: &ProjectConfig, out: &mut impl Write) -> std::io::Result<()> {
    let rooms = project.room_names();
    if rooms.is_empty() {
        writeln!(out, "No rooms listed in {}", project.path.display())?;
        return Ok(());
    }
    writeln!(out, "Rooms in {}:", project.name)?;
    for room in rooms {
        writeln!(out, "  {room}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_list_is_sorted() {
        let project = ProjectConfig::parse(
            "name: demo\nrooms:\n  wall:\n    hosts: [w1]\n  atrium:\n  localhost:\n",
            Path::new("/p/project.yaml"),
        )
        .unwrap();
        let mut out = Vec::new();
        list(&project, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Rooms in demo:\n  atrium\n  localhost\n  wall\n"
        );
    }

    #[test]
    fn test_list_without_rooms() {
        let project = ProjectConfig::parse("name: demo\n", Path::new("/p/project.yaml")).unwrap();
        let mut out = Vec::new();
        list(&project, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "No rooms listed in /p/project.yaml\n"
        );
    }
}
