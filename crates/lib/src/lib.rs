//! kiln-lib: reproducible build environments and release packaging.
//!
//! - [`manifest`]: the declarative toolchain manifest and its pinning rules
//! - [`plan`]: the manifest compiled into ordered, content-hashed steps
//! - [`provision`]: applying a plan inside an image build
//! - [`render`]: the Containerfile that builds the image
//! - [`verify`]: checking a provisioned image and its entry point
//! - [`driver`]: the release driver the image runs

pub mod consts;
pub mod driver;
pub mod execute;
pub mod manifest;
pub mod plan;
pub mod platform;
pub mod provision;
pub mod render;
pub mod util;
pub mod verify;
