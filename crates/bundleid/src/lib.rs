//! Bundle identifier collision resolution for multi-target iOS builds.
//!
//! Projects generated from templates often leave every target (the app, its
//! unit tests, share extensions, widgets) on the same bundle identifier. This
//! crate gives each target a role, derives a unique identifier from one base
//! value and writes the result into whichever layer is at hand:
//!
//! | Layer | Entry point |
//! |-------|-------------|
//! | `project.pbxproj` | [`rewrite::rewrite_descriptor`] |
//! | built `.app` directory | [`rewrite::rewrite_unpacked_bundle`] |
//! | packaged `.ipa` | [`rewrite::rewrite_packaged_archive`] |
//!
//! [`Resolver`] runs the whole pipeline for one layer.
//!
//! # Examples
//!
//! ```no_run
//! use bundleid::Resolver;
//!
//! let outcome = Resolver::new("com.acme.app").resolve("ios/Runner.xcodeproj")?;
//! print!("{}", outcome.summary);
//! # Ok::<(), bundleid::Error>(())
//! ```

pub mod allocate;
pub mod builder;
pub mod bundle;
pub mod classify;
pub mod config;
pub mod descriptor;
pub mod error;
pub(crate) mod fs;
pub mod identifier;
pub mod ipa;
pub mod rewrite;
pub mod validate;

pub use allocate::{allocate, Assignment, Provenance, ResidualCollision};
pub use builder::{Outcome, Resolver};
pub use classify::{classify_all, Classification, Confidence, Role};
pub use config::Overrides;
pub use descriptor::Descriptor;
pub use error::{Error, ParseError};
pub use identifier::BundleId;
pub use rewrite::{RewriteOptions, RewriteSummary};
pub use validate::{validate_path, Layer, Report};

pub type Result<T> = std::result::Result<T, Error>;
