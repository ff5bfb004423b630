//! Turning a component template plus context into a concrete artifact.
//!
//! Candidate generation is pure: [`ArtifactResolver::candidates`] depends
//! only on the template, the strategy and the context. Choosing among the
//! candidates needs the sandbox, which is reached only through an
//! [`ArtifactProbe`] so every probe is an explicit, logged command.

use crate::template::{ArtifactTemplate, ResolutionContext};
use crate::CoreError;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One deterministic artifact.
    Direct,
    /// Substitute `{number}` = 1, 2, … up to but excluding `limit`, running
    /// the acquisition action after each, until one succeeds.
    NumberedCandidate { limit: u32 },
    /// Probe the URL built with the full OS version, then with the OS major
    /// version only. Transfer happens after a positive probe.
    VersionDegradation,
}

/// Sandbox-side actions a resolver may need to choose a candidate.
pub trait ArtifactProbe {
    /// Perform the acquisition action for `reference`. `Ok(false)` means the
    /// action ran and failed; the next candidate may be tried.
    fn attempt(&mut self, reference: &str) -> Result<bool, CoreError>;

    /// Check whether `reference` is available without transferring it.
    fn exists(&mut self, reference: &str) -> Result<bool, CoreError>;
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub reference: String,
    /// Probes or attempts issued to reach `reference`.
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    component: String,
    template: ArtifactTemplate,
    strategy: Strategy,
}

impl ArtifactResolver {
    pub fn new(component: &str, template: ArtifactTemplate, strategy: Strategy) -> Self {
        Self {
            component: component.to_owned(),
            template,
            strategy,
        }
    }

    pub fn direct(component: &str, template: ArtifactTemplate) -> Self {
        Self::new(component, template, Strategy::Direct)
    }

    /// Every reference this resolver may try, in the order it tries them.
    pub fn candidates(&self, ctx: &ResolutionContext) -> Result<Vec<String>, CoreError> {
        match self.strategy {
            Strategy::Direct => Ok(vec![self.template.render(ctx)?]),
            Strategy::NumberedCandidate { limit } => (1..limit)
                .map(|n| self.template.render(&ctx.clone().with("number", n)))
                .collect(),
            Strategy::VersionDegradation => {
                let full = self.template.render(ctx)?;
                let major = ctx
                    .get("os_major_version")
                    .ok_or_else(|| CoreError::Template {
                        template: self.template.as_str().to_owned(),
                        placeholder: "os_major_version".to_owned(),
                    })?;
                let degraded = self
                    .template
                    .render(&ctx.clone().with("os_version", major))?;
                if degraded == full {
                    Ok(vec![full])
                } else {
                    Ok(vec![full, degraded])
                }
            }
        }
    }

    /// Pick a reference, probing the sandbox as the strategy requires.
    ///
    /// `Direct` never probes. `NumberedCandidate` calls
    /// [`ArtifactProbe::attempt`] per candidate and stops at the first
    /// success. `VersionDegradation` calls [`ArtifactProbe::exists`] only;
    /// the caller transfers the returned reference.
    pub fn resolve(
        &self,
        ctx: &ResolutionContext,
        probe: &mut dyn ArtifactProbe,
    ) -> Result<Resolution, CoreError> {
        let candidates = self.candidates(ctx)?;

        if self.strategy == Strategy::Direct {
            let reference = candidates.into_iter().next().unwrap_or_default();
            return Ok(Resolution {
                reference,
                attempts: 0,
            });
        }

        let mut attempts = 0;
        for candidate in &candidates {
            attempts += 1;
            let ok = match self.strategy {
                Strategy::NumberedCandidate { .. } => probe.attempt(candidate)?,
                _ => probe.exists(candidate)?,
            };
            if ok {
                info!("{}: resolved {candidate} after {attempts} attempt(s)", self.component);
                return Ok(Resolution {
                    reference: candidate.clone(),
                    attempts,
                });
            }
            debug!("{}: candidate unavailable: {candidate}", self.component);
        }

        Err(CoreError::ArtifactUnavailable {
            component: self.component.clone(),
            attempts,
            last: candidates.last().cloned().unwrap_or_default(),
        })
    }
}
