//! Shared constants.

pub const APP_NAME: &str = "kiln";

/// Length of the truncated hex digest used for step identifiers and stamps.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// January 1, 1980 00:00:00 UTC (ZIP epoch), used when `SOURCE_DATE_EPOCH` is unset.
pub const DEFAULT_SOURCE_DATE_EPOCH: u64 = 315532800;

/// PATH handed to provisioning commands before any step exports are applied.
pub const BASE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Default manifest file name.
pub const MANIFEST_FILENAME: &str = "kiln.toml";

/// Default in-image location of the manifest.
pub const IMAGE_MANIFEST_PATH: &str = "/etc/kiln/toolchain.toml";

/// Optional release configuration file looked up in the project root.
pub const RELEASE_CONFIG_FILENAME: &str = "kiln-release.toml";
