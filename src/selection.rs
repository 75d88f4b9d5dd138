use tracing::warn;

use crate::{
    error::TranscodeError,
    profiles::{EncodingProfile, ProfileRegistry},
};

/// Resolves requested names against the registry in caller order.
///
/// Unknown names are skipped with a warning and duplicates are kept. An empty
/// result is fatal: nothing may be compiled or spawned for it.
pub fn resolve<'a, S: AsRef<str>>(
    registry: &'a ProfileRegistry,
    requested: &[S],
) -> Result<Vec<&'a EncodingProfile>, TranscodeError> {
    let mut selected = Vec::with_capacity(requested.len());

    for name in requested {
        let name = name.as_ref();
        match registry.lookup(name) {
            Some(profile) => selected.push(profile),
            None => {
                let err = TranscodeError::UnknownProfile(name.to_owned());
                warn!(
                    profile = %name,
                    available = %registry.names().join(", "),
                    "{err}, skipping"
                );
            }
        }
    }

    if selected.is_empty() {
        return Err(TranscodeError::no_valid_profiles(requested));
    }

    Ok(selected)
}
