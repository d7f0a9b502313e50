use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::{env, fs};

static CONFIGS: &[(&str, usize)] = &[
    ("IFACE_MAX_DEVICE_COUNT", 4),
    ("IFACE_NEIGHBOR_CACHE_COUNT", 10),
    ("IFACE_MAX_ADDR_COUNT", 4),
    ("IFACE_MAX_PREFIX_COUNT", 8),
    ("IFACE_MAX_ROUTER_COUNT", 8),
    ("IFACE_MAX_ROUTE_COUNT", 16),
    ("ROUTE_MAX_NEXT_HOP_COUNT", 4),
    ("NEIGHBOR_MAX_DEST_COUNT", 8),
    ("NEIGHBOR_MAX_QUEUED_PACKETS", 3),
    ("PACKET_POOL_COUNT", 8),
    ("PACKET_POOL_BUFFER_SIZE", 1280),
    ("TIMER_QUEUE_COUNT", 64),
    ("POLICY_TABLE_COUNT", 8),
];

const ENV_PREFIX: &str = "SMOLND_";

fn main() {
    // only rebuild if build.rs changed. Otherwise Cargo will rebuild if any
    // other file changed.
    println!("cargo:rerun-if-changed=build.rs");

    let mut configs = HashMap::new();
    for (name, default) in CONFIGS {
        let var = format!("{ENV_PREFIX}{name}");
        println!("cargo:rerun-if-env-changed={var}");
        configs.insert(*name, *default);
    }

    for (var, value) in env::vars() {
        if let Some(name) = var.strip_prefix(ENV_PREFIX) {
            let Some(slot) = configs.get_mut(name) else {
                panic!("unknown config variable {var}");
            };
            *slot = value
                .parse()
                .unwrap_or_else(|_| panic!("{var} must be an unsigned integer, got {value:?}"));
        }
    }

    let mut data = String::new();
    for (name, _) in CONFIGS {
        let value = configs[name];
        writeln!(data, "pub const {name}: usize = {value};").unwrap();
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let out_file = out_dir.join("config.rs").to_string_lossy().to_string();
    fs::write(out_file, data).unwrap();
}
