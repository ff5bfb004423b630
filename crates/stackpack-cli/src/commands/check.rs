use super::{json_pretty, CommandError, EXIT_SUCCESS};
use stackpack_core::{validate_spec, CoreError, HandlerRegistry};
use stackpack_schema::{parse_spec_file, CompatibilityMatrix};
use std::path::Path;

/// Validate exactly as `build` does, without launching anything.
pub fn run(spec_path: &Path, matrix: &CompatibilityMatrix, json: bool) -> Result<u8, CommandError> {
    let raw = parse_spec_file(spec_path).map_err(CoreError::from)?;
    let spec = validate_spec(&raw, matrix, &HandlerRegistry::builtin())?;

    if json {
        let payload = serde_json::json!({
            "status": "valid",
            "os_major_version": spec.os_major_version(),
            "database_major_version": spec.database_major_version(),
            "specification": spec,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print!("{}", spec.manifest_text());
    }
    Ok(EXIT_SUCCESS)
}
