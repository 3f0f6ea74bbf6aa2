//! Resource knob rules: concurrency, CPU values, memory floors, and
//! region CPU ceilings.

use fnsync_core::{Cpu, Endpoint, PlatformVersion};

/// Regions whose machine shapes cap CPU at 4.
const REDUCED_CPU_REGIONS: &[&str] = &["australia-southeast2", "asia-northeast3", "asia-south2"];

const REDUCED_REGION_MAX_CPU: f64 = 4.0;

const DEFAULT_MEMORY_MB: u32 = 256;

/// Whole-numbered CPU sizes the platform offers above one unit.
const WHOLE_CPU_SIZES: &[f64] = &[2.0, 4.0, 6.0, 8.0];

fn resolved_cpu(endpoint: &Endpoint) -> Cpu {
    endpoint.cpu.unwrap_or(match endpoint.platform {
        PlatformVersion::Gen1 => Cpu::Gen1Default,
        PlatformVersion::Gen2 => Cpu::Units(1.0),
    })
}

fn resolved_memory(endpoint: &Endpoint) -> u32 {
    endpoint.memory_mb.unwrap_or(DEFAULT_MEMORY_MB)
}

/// Minimum memory for a whole-numbered CPU size.
fn min_memory_for_cpu(cpu: f64) -> Option<u32> {
    if cpu >= 8.0 {
        Some(4096)
    } else if cpu >= 6.0 {
        Some(3072)
    } else if cpu >= 4.0 {
        Some(2048)
    } else {
        None
    }
}

/// Minimum CPU units the given memory footprint requires.
fn min_cpu_for_memory(memory_mb: u32) -> Option<f64> {
    if memory_mb >= 1024 {
        Some(1.0)
    } else if memory_mb >= 512 {
        Some(0.5)
    } else {
        None
    }
}

pub(crate) fn validate_resources(endpoint: &Endpoint) -> Result<(), String> {
    let cpu = resolved_cpu(endpoint);
    let memory = resolved_memory(endpoint);

    if let Some(concurrency) = endpoint.concurrency {
        if concurrency > 1 {
            if endpoint.platform < PlatformVersion::Gen2 {
                return Err(format!(
                    "concurrency of {concurrency} requires the second platform generation"
                ));
            }
            match cpu {
                Cpu::Units(units) if units >= 1.0 => {}
                _ => {
                    return Err(format!(
                        "concurrency of {concurrency} requires at least one full CPU"
                    ));
                }
            }
        }
    }

    if let Cpu::Units(units) = cpu {
        let fractional_ok = units > 0.08 && units <= 1.0;
        if !fractional_ok && !WHOLE_CPU_SIZES.contains(&units) {
            return Err(format!(
                "invalid CPU of {units}: must be within (0.08, 1] or one of 2, 4, 6, 8"
            ));
        }

        if units > REDUCED_REGION_MAX_CPU
            && REDUCED_CPU_REGIONS.contains(&endpoint.region.as_str())
        {
            return Err(format!(
                "region {} supports at most {REDUCED_REGION_MAX_CPU} CPUs",
                endpoint.region
            ));
        }

        if let Some(min_memory) = min_memory_for_cpu(units) {
            if memory < min_memory {
                return Err(format!(
                    "{units} CPUs require at least {min_memory}MiB of memory"
                ));
            }
        }

        if let Some(min_cpu) = min_cpu_for_memory(memory) {
            if units < min_cpu {
                return Err(format!(
                    "{memory}MiB of memory requires at least {min_cpu} CPUs"
                ));
            }
        }
    }

    Ok(())
}
