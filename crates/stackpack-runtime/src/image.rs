use crate::backend::ImageRef;
use crate::RuntimeError;

/// Container repository for each supported OS name.
const OS_IMAGES: &[(&str, &str)] = &[
    ("oraclelinux", "oraclelinux"),
    ("rockylinux", "rockylinux/rockylinux"),
];

/// Map a validated OS name and version to its base image. The tag is the
/// OS version as written in the request.
pub fn resolve_os_image(os_name: &str, version: &str) -> Result<ImageRef, RuntimeError> {
    let repository = OS_IMAGES
        .iter()
        .find(|(name, _)| *name == os_name)
        .map(|(_, repo)| *repo)
        .ok_or_else(|| {
            let known: Vec<&str> = OS_IMAGES.iter().map(|(n, _)| *n).collect();
            RuntimeError::ImageNotFound(format!(
                "no base image for OS '{os_name}' (known: {})",
                known.join(", ")
            ))
        })?;

    Ok(ImageRef {
        repository: repository.to_owned(),
        tag: version.to_owned(),
    })
}
