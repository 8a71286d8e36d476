//! Register window mapper
//!
//! Opens the privileged memory device, resolves the peripheral base and maps
//! the five register windows. When the privileged device is refused it
//! falls back to the GPIO-only device; clock, PWM, SPI and interrupt
//! windows then become [`InertBlock`]s and writes to them do nothing.

use crate::config::Config;
use crate::error::MapError;

use super::discovery::{self, BaseAddress, BaseSource};
#[cfg(unix)]
use super::mmap;
use super::{Access, WindowSet};
#[cfg(unix)]
use super::{InertBlock, Peripheral, Window};

/// Result of a successful mapping
#[derive(Debug)]
pub struct Mapping {
    pub windows: WindowSet,
    /// Base the windows were mapped from; `None` for the GPIO-only device
    pub base: Option<BaseAddress>,
}

impl Mapping {
    pub fn access(&self) -> Access {
        self.windows.access()
    }
}

/// Resolve the peripheral base address for `config`
pub fn resolve_base(config: &Config) -> Result<BaseAddress, MapError> {
    if let Some(address) = config.base_address {
        return Ok(BaseAddress {
            address,
            source: BaseSource::Configured,
        });
    }

    match discovery::discover(&config.ranges_path) {
        Some(base) => Ok(base),
        None if config.legacy_fallback => {
            log::info!(
                "no base address in {}, using legacy {:#x}",
                config.ranges_path.display(),
                discovery::LEGACY_BASE
            );
            Ok(BaseAddress::legacy())
        }
        None => Err(MapError::AddressNotFound),
    }
}

/// Map every register window described by `config`
#[cfg(unix)]
pub fn map_windows(config: &Config) -> Result<Mapping, MapError> {
    use std::io::ErrorKind;

    match open_device(&config.mem_device) {
        Ok(file) => {
            let base = resolve_base(config)?;
            let map = |peripheral: Peripheral| -> Result<Window, MapError> {
                let offset = base.address + peripheral.offset();
                Ok(Box::new(mmap::MappedWindow::map(&file, offset, peripheral)?))
            };
            let windows = WindowSet::new(
                Access::Full,
                map(Peripheral::Gpio)?,
                map(Peripheral::Clock)?,
                map(Peripheral::Pwm)?,
                map(Peripheral::Spi)?,
                map(Peripheral::Interrupt)?,
            );
            drop(file);

            log::debug!("mapped all windows from base {:#x}", base.address);
            Ok(Mapping {
                windows,
                base: Some(base),
            })
        }
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            log::warn!(
                "{} not accessible ({}), falling back to {}: clock, PWM and SPI writes will be ignored",
                config.mem_device.display(),
                err,
                config.gpiomem_device.display()
            );
            map_restricted(config)
        }
        Err(source) => Err(MapError::Device {
            path: config.mem_device.clone(),
            source,
        }),
    }
}

#[cfg(not(unix))]
pub fn map_windows(_config: &Config) -> Result<Mapping, MapError> {
    Err(MapError::Unsupported)
}

#[cfg(unix)]
fn map_restricted(config: &Config) -> Result<Mapping, MapError> {
    let file = open_device(&config.gpiomem_device).map_err(|err| {
        log::debug!("{}: {}", config.gpiomem_device.display(), err);
        MapError::PermissionDenied {
            mem: config.mem_device.clone(),
            gpiomem: config.gpiomem_device.clone(),
        }
    })?;

    // The GPIO-only device exposes its block at offset 0.
    let gpio = mmap::MappedWindow::map(&file, 0, Peripheral::Gpio)?;
    drop(file);

    let windows = WindowSet::new(
        Access::Restricted,
        Box::new(gpio),
        Box::new(InertBlock),
        Box::new(InertBlock),
        Box::new(InertBlock),
        Box::new(InertBlock),
    );

    Ok(Mapping {
        windows,
        base: None,
    })
}

#[cfg(unix)]
fn open_device(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(path)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::mem::Peripheral;
    use std::fs::{self, File};
    use std::io::{Read, Seek, SeekFrom};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A sparse file large enough to hold every block at base 0
    fn fake_mem(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("mem");
        let file = File::create(&path).unwrap();
        file.set_len(Peripheral::Pwm.offset() + 4096).unwrap();
        path
    }

    fn word_at(path: &Path, offset: u64) -> u32 {
        let mut file = File::open(path).unwrap();
        let mut word = [0u8; 4];
        file.seek(SeekFrom::Start(offset)).unwrap();
        file.read_exact(&mut word).unwrap();
        u32::from_ne_bytes(word)
    }

    #[test]
    fn test_configured_base_skips_discovery() {
        let config = Config::default()
            .with_ranges_path("/nonexistent")
            .with_base_address(0xFE00_0000);
        let base = resolve_base(&config).unwrap();
        assert_eq!(base.address, 0xFE00_0000);
        assert_eq!(base.source, BaseSource::Configured);
    }

    #[test]
    fn test_missing_ranges_without_fallback() {
        let mut config = Config::default().with_ranges_path("/nonexistent/ranges");
        config.legacy_fallback = false;
        assert!(matches!(resolve_base(&config), Err(MapError::AddressNotFound)));

        config.legacy_fallback = true;
        assert_eq!(resolve_base(&config).unwrap(), BaseAddress::legacy());
    }

    #[test]
    fn test_full_mapping_places_each_block() {
        let dir = TempDir::new().unwrap();
        let mem = fake_mem(&dir);
        let config = Config::default()
            .with_devices(&mem, dir.path().join("gpiomem"))
            .with_base_address(0);

        let mut mapping = map_windows(&config).unwrap();
        assert_eq!(mapping.access(), Access::Full);

        mapping.windows.gpio().write(7, 1 << 4);
        mapping.windows.clock().write(28, 0x5A00_0011);
        mapping.windows.pwm().write(0, 0x81);
        mapping.windows.spi().write(2, 128);
        mapping.windows.interrupt().write(0x210 / 4, 0xAA);
        mapping.windows.release().unwrap();

        assert_eq!(word_at(&mem, Peripheral::Gpio.offset() + 7 * 4), 1 << 4);
        assert_eq!(word_at(&mem, Peripheral::Clock.offset() + 28 * 4), 0x5A00_0011);
        assert_eq!(word_at(&mem, Peripheral::Pwm.offset()), 0x81);
        assert_eq!(word_at(&mem, Peripheral::Spi.offset() + 8), 128);
        assert_eq!(word_at(&mem, Peripheral::Interrupt.offset() + 0x210), 0xAA);
    }

    #[test]
    fn test_discovered_base_from_ranges() {
        let dir = TempDir::new().unwrap();
        let mem = fake_mem(&dir);
        // Base 0x1000 (page aligned), file extended to cover it
        File::options()
            .write(true)
            .open(&mem)
            .unwrap()
            .set_len(0x1000 + Peripheral::Pwm.offset() + 4096)
            .unwrap();
        let ranges = dir.path().join("ranges");
        fs::write(&ranges, [0x7e, 0, 0, 0, 0, 0, 0x10, 0, 0, 0, 0, 0]).unwrap();

        let config = Config::default()
            .with_devices(&mem, dir.path().join("gpiomem"))
            .with_ranges_path(&ranges);
        let mut mapping = map_windows(&config).unwrap();
        assert_eq!(
            mapping.base,
            Some(BaseAddress {
                address: 0x1000,
                source: BaseSource::Ranges { offset: 4 },
            })
        );

        mapping.windows.gpio().write(0, 0x1234);
        mapping.windows.release().unwrap();
        assert_eq!(word_at(&mem, 0x1000 + Peripheral::Gpio.offset()), 0x1234);
    }

    #[test]
    fn test_restricted_mapping_is_gpio_only() {
        let dir = TempDir::new().unwrap();
        let gpiomem = dir.path().join("gpiomem");
        File::create(&gpiomem).unwrap().set_len(4096).unwrap();
        let config = Config::default().with_devices(dir.path().join("mem"), &gpiomem);

        let mut mapping = map_restricted(&config).unwrap();
        assert_eq!(mapping.access(), Access::Restricted);
        assert_eq!(mapping.base, None);

        mapping.windows.gpio().write(1, 0o1001);
        mapping.windows.clock().write(28, 0x5A00_0011);
        assert_eq!(mapping.windows.clock().read(28), 0);
        mapping.windows.release().unwrap();
        assert_eq!(word_at(&gpiomem, 4), 0o1001);
    }

    #[test]
    fn test_refused_mem_device_falls_back_to_gpiomem() {
        use std::os::unix::fs::PermissionsExt;

        // Root ignores file modes
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let dir = TempDir::new().unwrap();
        let mem = fake_mem(&dir);
        fs::set_permissions(&mem, fs::Permissions::from_mode(0o000)).unwrap();
        let gpiomem = dir.path().join("gpiomem");
        File::create(&gpiomem).unwrap().set_len(4096).unwrap();
        let config = Config::default()
            .with_devices(&mem, &gpiomem)
            .with_base_address(0);

        let mut mapping = map_windows(&config).unwrap();
        assert_eq!(mapping.access(), Access::Restricted);
        assert_eq!(mapping.base, None);

        mapping.windows.gpio().write(7, 1 << 17);
        mapping.windows.release().unwrap();
        assert_eq!(word_at(&gpiomem, 7 * 4), 1 << 17);
    }

    #[test]
    fn test_restricted_device_missing_is_permission_denied() {
        let dir = TempDir::new().unwrap();
        let config = Config::default()
            .with_devices(dir.path().join("mem"), dir.path().join("gpiomem"));

        let err = map_restricted(&config).unwrap_err();
        assert!(matches!(err, MapError::PermissionDenied { .. }));
    }

    #[test]
    fn test_missing_device_is_reported() {
        let dir = TempDir::new().unwrap();
        let config = Config::default()
            .with_devices(dir.path().join("mem"), dir.path().join("gpiomem"))
            .with_base_address(0);

        let err = map_windows(&config).unwrap_err();
        assert!(matches!(err, MapError::Device { .. }));
    }

    #[test]
    fn test_map_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let mem = dir.path().join("mem");
        File::create(&mem).unwrap();
        // Unaligned base makes every mmap fail
        let config = Config::default()
            .with_devices(&mem, dir.path().join("gpiomem"))
            .with_base_address(0x10);

        let err = map_windows(&config).unwrap_err();
        assert!(matches!(
            err,
            MapError::MapFailed { peripheral: Peripheral::Gpio, .. }
        ));
    }
}
