//! Story Harness
//!
//! Mounts UI stories (a component plus the props it is rendered with) into a
//! real browser page for integration tests:
//! - Resolves the story module a test file mounts
//! - Compiles stories, the framework runtime and a mount shim with esbuild
//! - Serves the compiled workspace over loopback HTTP
//! - Drives a page to mount a story and push new props into it
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Test run (global setup/teardown)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WorkspaceManager                                           │
//! │    ├── begin() -> RunContext                                │
//! │    │     ├── create temp workspace                          │
//! │    │     ├── bundle framework packages + mount shim         │
//! │    │     └── ServerHandle::start(workspace)                 │
//! │    └── end()  (stop server, delete workspace)               │
//! │  prebundle(ctx, suite)  (every story in one build)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Per test                                                   │
//! │    MountDriver<P: StoryPage>                                │
//! │      ├── mount_story(test_file, props, options)             │
//! │      │     ├── StoryResolver::resolve                       │
//! │      │     ├── bundle story (unless pre-bundled)            │
//! │      │     └── goto mount.html + inject render script       │
//! │      └── update_story(props)  (same tree, new props)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bundler;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod prebundle;
pub mod resolver;
pub mod runtime;
pub mod server;
pub mod suite;
pub mod wait;
pub mod workspace;

pub use bundler::{BuildOptions, BundleRequest, Bundler, EntryPoint, EsbuildBundler};
pub use config::HarnessConfig;
pub use context::{RunContext, RuntimeMode};
pub use driver::{MountDriver, MountOptions, StoryPage};
pub use error::{HarnessError, HarnessResult};
pub use prebundle::{prebundle, PrebundleManifest};
pub use resolver::{StoryRef, StoryResolver};
pub use server::ServerHandle;
pub use suite::{Suite, TestCase};
pub use workspace::WorkspaceManager;
