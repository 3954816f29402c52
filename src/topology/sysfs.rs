//! Build a [`Topology`] from the Linux sysfs CPU tree.
//!
//! Reads `cpuN/topology/{physical_package_id,core_id}`,
//! `cpuN/cache/indexK/{level,type,size,shared_cpu_list}` and
//! `cpuN/cpufreq/cpuinfo_max_freq`, plus `MemTotal` from meminfo. Missing
//! files are tolerated; only an empty CPU list is an error.

use super::{AttributeValue, ComponentKind, NodeId, Topology};
use crate::core::config::TopologyConfig;
use crate::core::{Result, TopoError};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
struct CpuEntry {
    id: u32,
    package: u32,
    core: u32,
    max_freq_khz: Option<u64>,
    caches: Vec<CacheEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheEntry {
    level: u32,
    kind: String,
    size_bytes: Option<u64>,
    shared: Vec<u32>,
}

/// Load the topology from the paths in `config`
pub fn load(config: &TopologyConfig) -> Result<(Topology, NodeId)> {
    load_from(&config.sysfs_cpu_root, Some(&config.meminfo))
}

/// Load the topology from an explicit sysfs CPU root and meminfo file
pub fn load_from(cpu_root: &Path, meminfo: Option<&Path>) -> Result<(Topology, NodeId)> {
    let cpus = read_cpus(cpu_root)?;
    if cpus.is_empty() {
        return Err(TopoError::topology(format!("no CPUs found under {}", cpu_root.display())));
    }

    let mut topo = Topology::new();
    let root = topo.add_root(ComponentKind::Node, 0, "machine");

    if let Some(total) = meminfo
        .and_then(|path| fs::read_to_string(path).ok())
        .and_then(|text| parse_mem_total_bytes(&text))
    {
        let memory = topo.add_child(root, ComponentKind::Memory, 0, "main memory");
        topo.set_attribute(memory, "size", AttributeValue::UInt(total));
    }

    let mut chips = BTreeMap::new();
    let mut cores = BTreeMap::new();
    let mut core_of_cpu = BTreeMap::new();
    let mut next_core_id = 0;

    for cpu in &cpus {
        let chip = *chips.entry(cpu.package).or_insert_with(|| {
            topo.add_child(root, ComponentKind::Chip, cpu.package, format!("package {}", cpu.package))
        });
        let core = *cores.entry((cpu.package, cpu.core)).or_insert_with(|| {
            let node = topo.add_child(chip, ComponentKind::Core, next_core_id, format!("core {}", cpu.core));
            next_core_id += 1;
            node
        });
        let thread = topo.add_child(core, ComponentKind::Thread, cpu.id, format!("cpu {}", cpu.id));
        if let Some(freq) = cpu.max_freq_khz {
            topo.set_attribute(thread, "max_freq_khz", AttributeValue::UInt(freq));
        }
        core_of_cpu.insert(cpu.id, (cpu.package, cpu.core));
    }

    let unique_caches: BTreeSet<CacheEntry> =
        cpus.iter().flat_map(|cpu| cpu.caches.iter().cloned()).collect();

    for (idx, cache) in unique_caches.iter().enumerate() {
        let owners: BTreeSet<(u32, u32)> = cache
            .shared
            .iter()
            .filter_map(|cpu| core_of_cpu.get(cpu).copied())
            .collect();
        let packages: BTreeSet<u32> = owners.iter().map(|(package, _)| *package).collect();

        let parent = match (owners.len(), packages.len()) {
            (1, _) => owners.iter().next().and_then(|key| cores.get(key).copied()),
            (_, 1) => packages.iter().next().and_then(|package| chips.get(package).copied()),
            _ => None,
        }
        .unwrap_or(root);

        let name = format!("L{} {} cache", cache.level, cache.kind.to_lowercase());
        let node = topo.add_child(parent, ComponentKind::Cache, idx as u32, name);
        topo.set_attribute(node, "cache_level", AttributeValue::UInt(u64::from(cache.level)));
        topo.set_attribute(node, "cache_type", AttributeValue::Text(cache.kind.clone()));
        if let Some(size) = cache.size_bytes {
            topo.set_attribute(node, "cache_size", AttributeValue::UInt(size));
        }
    }

    debug!(
        cpus = cpus.len(),
        packages = chips.len(),
        cores = cores.len(),
        caches = unique_caches.len(),
        "loaded sysfs topology"
    );

    Ok((topo, root))
}

fn read_cpus(cpu_root: &Path) -> Result<Vec<CpuEntry>> {
    let entries = fs::read_dir(cpu_root)?;
    let mut cpus = Vec::new();

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let Some(id_text) = name.strip_prefix("cpu") else {
            continue;
        };
        if id_text.is_empty() || !id_text.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(id) = id_text.parse::<u32>() else {
            continue;
        };

        let base = entry.path();
        if read_u64(&base.join("online")) == Some(0) {
            continue;
        }

        let package = read_i64(&base.join("topology/physical_package_id"))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        let core = read_i64(&base.join("topology/core_id"))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(id);

        cpus.push(CpuEntry {
            id,
            package,
            core,
            max_freq_khz: read_u64(&base.join("cpufreq/cpuinfo_max_freq")),
            caches: read_caches(&base.join("cache"), id),
        });
    }

    cpus.sort_by_key(|cpu| cpu.id);
    Ok(cpus)
}

fn read_caches(cache_root: &Path, cpu: u32) -> Vec<CacheEntry> {
    let Ok(entries) = fs::read_dir(cache_root) else {
        return Vec::new();
    };

    let mut caches = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with("index") {
            continue;
        }
        let base = entry.path();
        let Some(level) = read_u64(&base.join("level")).and_then(|v| u32::try_from(v).ok()) else {
            continue;
        };
        let kind = read_trimmed(&base.join("type")).unwrap_or_else(|| "Unified".to_string());
        let shared = read_trimmed(&base.join("shared_cpu_list"))
            .and_then(|text| parse_cpu_list(&text))
            .unwrap_or_else(|| vec![cpu]);

        caches.push(CacheEntry {
            level,
            kind,
            size_bytes: read_trimmed(&base.join("size")).and_then(|text| parse_size_bytes(&text)),
            shared,
        });
    }
    caches
}

/// Parse a kernel CPU list such as `0-3,8,10-11`.
pub fn parse_cpu_list(text: &str) -> Option<Vec<u32>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut cpus = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = start.trim().parse::<u32>().ok()?;
            let end = end.trim().parse::<u32>().ok()?;
            if end < start {
                return None;
            }
            cpus.extend(start..=end);
        } else {
            cpus.push(part.parse::<u32>().ok()?);
        }
    }

    cpus.sort_unstable();
    cpus.dedup();
    Some(cpus)
}

fn parse_size_bytes(text: &str) -> Option<u64> {
    let text = text.trim();
    let (digits, multiplier) = match text.chars().last()? {
        'K' | 'k' => (&text[..text.len() - 1], 1024),
        'M' | 'm' => (&text[..text.len() - 1], 1024 * 1024),
        'G' | 'g' => (&text[..text.len() - 1], 1024 * 1024 * 1024),
        _ => (text, 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

fn parse_mem_total_bytes(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|line| line.starts_with("MemTotal:"))?;
    let kib = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    kib.checked_mul(1024)
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_u64(path: &Path) -> Option<u64> {
    read_trimmed(path)?.parse().ok()
}

fn read_i64(path: &Path) -> Option<i64> {
    read_trimmed(path)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fake_cpu(root: &Path, cpu: u32, core: u32, siblings: &str) {
        let base = root.join(format!("cpu{}", cpu));
        write(base.join("topology/physical_package_id"), "0\n");
        write(base.join("topology/core_id"), &format!("{}\n", core));
        write(base.join("cpufreq/cpuinfo_max_freq"), "3600000\n");

        write(base.join("cache/index0/level"), "1\n");
        write(base.join("cache/index0/type"), "Data\n");
        write(base.join("cache/index0/size"), "48K\n");
        write(base.join("cache/index0/shared_cpu_list"), &format!("{}\n", siblings));

        write(base.join("cache/index3/level"), "3\n");
        write(base.join("cache/index3/type"), "Unified\n");
        write(base.join("cache/index3/size"), "30720K\n");
        write(base.join("cache/index3/shared_cpu_list"), "0-2\n");
    }

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3,8"), Some(vec![0, 1, 2, 3, 8]));
        assert_eq!(parse_cpu_list("5"), Some(vec![5]));
        assert_eq!(parse_cpu_list(" 2,0-1 \n"), Some(vec![0, 1, 2]));
        assert_eq!(parse_cpu_list("3-1"), None);
        assert_eq!(parse_cpu_list(""), None);
        assert_eq!(parse_cpu_list("a-b"), None);
    }

    #[test]
    fn test_parse_sizes() {
        assert_eq!(parse_size_bytes("48K"), Some(48 * 1024));
        assert_eq!(parse_size_bytes("2M"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size_bytes("512"), Some(512));
        assert_eq!(parse_size_bytes("K"), None);
        assert_eq!(parse_mem_total_bytes("MemTotal:  16384 kB\nMemFree: 1 kB\n"), Some(16384 * 1024));
        assert_eq!(parse_mem_total_bytes("MemFree: 1 kB\n"), None);
    }

    #[test]
    fn test_load_fake_sysfs() {
        let dir = TempDir::new().unwrap();
        let cpu_root = dir.path().join("cpu");
        // cpu0 and cpu1 are SMT siblings on core 0, cpu2 sits alone on core 1
        fake_cpu(&cpu_root, 0, 0, "0-1");
        fake_cpu(&cpu_root, 1, 0, "0-1");
        fake_cpu(&cpu_root, 2, 1, "2");
        write(cpu_root.join("cpufreq/policy0"), "");
        let meminfo = dir.path().join("meminfo");
        write(meminfo.clone(), "MemTotal:        8192 kB\n");

        let (topo, root) = load_from(&cpu_root, Some(&meminfo)).unwrap();

        assert_eq!(topo.find_all(root, ComponentKind::Chip).len(), 1);
        assert_eq!(topo.find_all(root, ComponentKind::Core).len(), 2);
        assert_eq!(topo.find_all(root, ComponentKind::Thread).len(), 3);

        let caches = topo.find_all(root, ComponentKind::Cache);
        // two private L1d caches and one shared L3
        assert_eq!(caches.len(), 3);

        let l3 = caches
            .iter()
            .copied()
            .find(|&c| topo.attribute(c, "cache_level") == Some(&AttributeValue::UInt(3)))
            .unwrap();
        let l3_parent = topo.get(l3).unwrap().parent().unwrap();
        assert_eq!(topo.get(l3_parent).unwrap().kind(), ComponentKind::Chip);
        assert_eq!(topo.attribute(l3, "cache_size"), Some(&AttributeValue::UInt(30720 * 1024)));

        let cpu1 = topo.find(root, 1, ComponentKind::Thread).unwrap();
        let core = topo.get(cpu1).unwrap().parent().unwrap();
        assert_eq!(topo.get(core).unwrap().kind(), ComponentKind::Core);
        assert_eq!(topo.attribute(cpu1, "max_freq_khz"), Some(&AttributeValue::UInt(3_600_000)));

        let memory = topo.find_all(root, ComponentKind::Memory);
        assert_eq!(memory.len(), 1);
        assert_eq!(topo.attribute(memory[0], "size"), Some(&AttributeValue::UInt(8192 * 1024)));
    }

    #[test]
    fn test_offline_cpus_are_skipped() {
        let dir = TempDir::new().unwrap();
        fake_cpu(dir.path(), 0, 0, "0");
        fake_cpu(dir.path(), 1, 1, "1");
        write(dir.path().join("cpu1/online"), "0\n");

        let (topo, root) = load_from(dir.path(), None).unwrap();
        assert!(topo.find(root, 0, ComponentKind::Thread).is_some());
        assert!(topo.find(root, 1, ComponentKind::Thread).is_none());
    }

    #[test]
    fn test_empty_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_from(dir.path(), None).unwrap_err();
        assert_eq!(err.category(), "topology");

        let missing = load_from(&dir.path().join("nope"), None).unwrap_err();
        assert_eq!(missing.category(), "io");
    }
}
