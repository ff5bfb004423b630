use super::{colorize_status, json_pretty, CommandError, EXIT_SUCCESS};
use stackpack_schema::{CompatibilityMatrix, VersionConstraint};
use std::collections::BTreeSet;

pub fn run(matrix: &CompatibilityMatrix, json: bool) -> Result<u8, CommandError> {
    if json {
        println!("{}", json_pretty(matrix)?);
        return Ok(EXIT_SUCCESS);
    }

    for (name, constraint) in matrix.iter() {
        match constraint {
            VersionConstraint::Flat(versions) => println!("{name:<34} {}", join(versions)),
            VersionConstraint::ByDatabaseMajor(by_major) => {
                println!("{name:<34} {}", colorize_status("nested"));
                for (major, versions) in by_major {
                    println!("  postgresql {major:<21} {}", join(versions));
                }
            }
        }
    }
    Ok(EXIT_SUCCESS)
}

fn join(versions: &BTreeSet<String>) -> String {
    versions.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
