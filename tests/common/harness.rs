//! Shared builders for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file
//! in `tests/`). Helpers live under `tests/common/` and are pulled in with:
//!
//! ```rust,ignore
//! #[path = "common/harness.rs"]
//! mod harness;
//! ```

use camino::Utf8PathBuf;
use devicelibrary::test_support::{ScriptedDevice, ScriptedFactory};
use devicelibrary::{
    AdapterSettings, AdapterVariant, DeviceLibrary, FactoryRegistry, LibraryConfig,
};
use tempfile::TempDir;

/// Configuration that never sleeps between attempts and never finds an
/// environment file.
pub fn quiet_config() -> LibraryConfig {
    LibraryConfig {
        retry_attempts: 1,
        env_file: String::from("integration-missing.env"),
        ..LibraryConfig::default()
    }
}

/// A library whose only factory serves `variant` from a scripted device.
pub struct Harness {
    pub library: DeviceLibrary,
    pub factory: ScriptedFactory,
    pub device: ScriptedDevice,
}

impl Harness {
    pub fn new(variant: AdapterVariant, config: LibraryConfig) -> Self {
        let device = ScriptedDevice::new("scripted");
        let factory = ScriptedFactory::new(variant);
        factory.push_device(device.clone());
        let library = DeviceLibrary::new(
            config,
            FactoryRegistry::new().with_factory(variant, factory.clone()),
        );
        Self {
            library,
            factory,
            device,
        }
    }

    pub fn with_adapter_settings(self, settings: AdapterSettings) -> Self {
        Self {
            library: self.library.with_adapter_settings(settings),
            ..self
        }
    }
}

/// Temporary directory addressed through UTF-8 paths.
pub struct Scratch {
    _tmp: TempDir,
    pub root: Utf8PathBuf,
}

impl Scratch {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
        Self { _tmp: tmp, root }
    }

    pub fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write {path}: {err}"));
        path
    }
}
