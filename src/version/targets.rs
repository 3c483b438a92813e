//! Files of the SDK distribution that record the canonical version.

use super::{TargetFormat, VersionTarget};

/// Every downstream file the canonical version is propagated into
pub fn default_targets() -> Vec<VersionTarget> {
    vec![
        VersionTarget::file(
            "statsig_metadata.rs",
            "statsig-lib/src/statsig_metadata.rs",
            TargetFormat::field("sdk_version"),
        ),
        VersionTarget::file(
            "statsig-napi package.json",
            "statsig-napi/package.json",
            TargetFormat::JsonManifest,
        ),
        VersionTarget::file(
            "statsig-node package.json",
            "statsig-node/package.json",
            TargetFormat::JsonManifest,
        ),
        VersionTarget::optional_glob(
            "statsig-napi platform packages",
            "statsig-napi/npm/*/package.json",
            TargetFormat::JsonManifest,
        ),
        VersionTarget::optional_glob(
            "statsig-node platform packages",
            "statsig-node/npm/*/package.json",
            TargetFormat::JsonManifest,
        ),
        VersionTarget::file(
            "gradle.properties",
            "statsig-ffi/bindings/java/gradle.properties",
            TargetFormat::property("version"),
        ),
        VersionTarget::file(
            "statsig-lib -> sigstat-grpc dependency",
            "statsig-lib/Cargo.toml",
            TargetFormat::cargo_dependency("sigstat-grpc"),
        ),
        VersionTarget::file(
            "post-install.php",
            "statsig-php/post-install.php",
            TargetFormat::literal("const VERSION = "),
        ),
    ]
}
