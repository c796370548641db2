use log::debug;

use crate::emulator::CdEmulator;

/// Capability record of the single reported auxiliary output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxCaps {
    pub manufacturer_id: u16,
    pub product_id: u16,
    pub driver_version: u16,
    pub name: &'static str,
    pub technology: AuxTechnology,
    pub supports_volume: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxTechnology {
    CdAudio,
}

impl CdEmulator {
    /// Number of auxiliary output devices; always exactly one.
    pub fn aux_num_devices(&self) -> u32 {
        1
    }

    pub fn aux_device_caps(&self) -> AuxCaps {
        AuxCaps {
            manufacturer_id: 2,
            product_id: 401,
            driver_version: 1,
            name: "Virtual CD-audio output",
            technology: AuxTechnology::CdAudio,
            supports_volume: true,
        }
    }

    /// The legacy surface never reports a meaningful mixer level.
    pub fn aux_get_volume(&self) -> u32 {
        0
    }

    /// Apply a raw volume word. Repeats of the same word are ignored; the
    /// low 16 bits (left channel) map linearly to the playback percent.
    pub fn aux_set_volume(&self, raw: u32) {
        {
            let mut last = self
                .aux_last_volume
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *last == Some(raw) {
                return;
            }
            *last = Some(raw);
        }
        let left = raw & 0xFFFF;
        let percent = left * 100 / 0xFFFF;
        debug!("aux volume word {:#010x} -> {}%", raw, percent);
        self.set_volume(percent);
    }
}
