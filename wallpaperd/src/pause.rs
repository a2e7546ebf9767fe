//! Pause policy probes (spec §4.G step 5, §9 design note: "the Hyprland path
//! runs an external command... this is a portability liability and should be
//! rewritten against the compositor's IPC protocol directly" / "`system(...)`
//! is used... these should become explicit IPC / filesystem probes in a
//! rewrite"). `battery_discharging` is exactly that rewrite: a sysfs read
//! instead of a shelled-out command. `output_hidden` is the surface's own
//! predicate (spec §1: surfaces are external collaborators that expose an
//! `output_hidden()` query).

use std::fs;

/// `true` if any `/sys/class/power_supply/BAT*` reports `Discharging`.
/// `false` (never pause) on any read failure, including "no battery present".
pub fn battery_discharging() -> bool {
    let Ok(entries) = fs::read_dir("/sys/class/power_supply") else {
        return false;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with("BAT") {
            continue;
        }
        if let Ok(status) = fs::read_to_string(entry.path().join("status")) {
            if status.trim() == "Discharging" {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_panic_without_a_battery() {
        let _ = battery_discharging();
    }
}
