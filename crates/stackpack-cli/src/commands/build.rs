use super::{
    colorize_status, json_pretty, spin_fail, spin_ok, spinner, CommandError,
    EXIT_ENVIRONMENT_ERROR, EXIT_SUCCESS,
};
use stackpack_core::{
    validate_spec, CoreError, HandlerRegistry, PipelineOptions, ProvisioningOutcome,
    ProvisioningPipeline,
};
use stackpack_runtime::{check_backend_prereqs, format_missing, select_backend};
use stackpack_schema::{parse_spec_file, CompatibilityMatrix};
use std::path::Path;

pub fn run(
    spec_path: &Path,
    matrix: &CompatibilityMatrix,
    backend_name: &str,
    options: PipelineOptions,
    json: bool,
) -> Result<u8, CommandError> {
    let raw = parse_spec_file(spec_path).map_err(CoreError::from)?;
    // An invalid spec never reaches the host checks.
    if let Err(e) = options
        .check()
        .and_then(|()| validate_spec(&raw, matrix, &HandlerRegistry::builtin()))
    {
        let outcomes = [ProvisioningOutcome::Failed {
            step: "validate".to_owned(),
            kind: e.kind(),
            output: e.to_string(),
        }];
        return fail(e, &outcomes, json);
    }

    let backend = select_backend(backend_name)
        .map_err(|e| CoreError::Environment(e.to_string()))?;
    if std::env::var("STACKPACK_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = check_backend_prereqs(backend_name);
        if !missing.is_empty() {
            return Err(CommandError {
                code: EXIT_ENVIRONMENT_ERROR,
                message: format_missing(&missing),
            });
        }
    }

    let pb = if json {
        None
    } else {
        Some(spinner("provisioning sandbox..."))
    };

    let mut pipeline = ProvisioningPipeline::new(&*backend, matrix, options).on_step(
        |state, step| {
            if let Some(ref pb) = pb {
                pb.set_message(format!("{state} ({step})"));
            }
        },
    );
    let result = pipeline.run(&raw);
    let outcomes = pipeline.outcomes().to_vec();
    drop(pipeline);

    let report = match result {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "bundle built");
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "build failed");
            }
            return fail(e, &outcomes, json);
        }
    };

    if json {
        let payload = serde_json::json!({
            "status": "success",
            "manifest": report.specification.manifest_text(),
            "bundle": report.bundle,
            "log": report.log_path,
            "outcomes": report.outcomes,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print_outcomes(&report.outcomes);
        println!(
            "wrote {} ({} bytes, {} entries)",
            report.bundle.path.display(),
            report.bundle.size,
            report.bundle.entries
        );
        println!("blake3: {}", report.bundle.blake3);
        if let Some(ref log) = report.log_path {
            println!("log: {}", log.display());
        }
    }
    Ok(EXIT_SUCCESS)
}

fn fail(e: CoreError, outcomes: &[ProvisioningOutcome], json: bool) -> Result<u8, CommandError> {
    if json {
        let payload = serde_json::json!({
            "status": "failed",
            "kind": e.kind(),
            "error": e.to_string(),
            "outcomes": outcomes,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print_outcomes(outcomes);
    }
    Err(e.into())
}

fn print_outcomes(outcomes: &[ProvisioningOutcome]) {
    for outcome in outcomes {
        let status = if outcome.is_success() {
            "success"
        } else {
            "failed"
        };
        println!("  {:<24} {}", outcome.step(), colorize_status(status));
    }
}
