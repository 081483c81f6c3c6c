//! Default origin derived from repository metadata.
//!
//! Inspecting the checkout is left to a [`GitMetadataProvider`]; this module
//! only turns `{owner, repo, ref}` into the preview origin URL.

/// Repository coordinates of the current checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
}

/// Source of repository metadata for the project directory.
pub trait GitMetadataProvider: Send + Sync {
    /// Returns `None` when the project is not a usable checkout.
    fn git_info(&self) -> Option<GitInfo>;
}

/// Provider backed by values known up front (e.g. CLI flags).
#[derive(Debug, Clone)]
pub struct StaticGitMetadata(pub Option<GitInfo>);

impl GitMetadataProvider for StaticGitMetadata {
    fn git_info(&self) -> Option<GitInfo> {
        self.0.clone()
    }
}

/// Build the preview origin, `https://<ref>--<repo>--<owner>.hlx.page`.
///
/// Each part is lowercased and anything outside `[a-z0-9]` becomes `-`,
/// so branch names like `feature/Header` stay valid host labels.
pub fn default_origin(info: &GitInfo) -> String {
    format!(
        "https://{}--{}--{}.hlx.page",
        host_label(&info.git_ref),
        host_label(&info.repo),
        host_label(&info.owner)
    )
}

/// Resolve the origin from a provider, if it has anything to offer.
pub fn origin_from(provider: &dyn GitMetadataProvider) -> Option<String> {
    provider.git_info().map(|info| default_origin(&info))
}

fn host_label(part: &str) -> String {
    part.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_preview_origin() {
        let info = GitInfo {
            owner: "Adobe".into(),
            repo: "helix-website".into(),
            git_ref: "feature/New_Header".into(),
        };
        assert_eq!(
            default_origin(&info),
            "https://feature-new-header--helix-website--adobe.hlx.page"
        );
    }

    #[test]
    fn provider_without_info_yields_none() {
        assert!(origin_from(&StaticGitMetadata(None)).is_none());
    }
}
