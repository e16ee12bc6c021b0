//! Core-pinned task spawning for the ESP32-S3's two cores.
//!
//! ESP-IDF runs `std::thread` on pthreads, which are FreeRTOS tasks
//! underneath. `esp_pthread_set_cfg()` stores a thread-local config that
//! the *next* `pthread_create()` from the calling thread picks up, so the
//! config/spawn pair below must not interleave with other spawns on the
//! same thread. On host builds the core and priority are ignored.

/// CPU core identifiers for the ESP32-S3 Xtensa LX7 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks and the network loop.
    Pro = 0,
    /// Core 1 (APP_CPU): sensors and the bus.
    App = 1,
}

/// Where and how a task runs.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
    /// NUL-terminated, e.g. `"core1-hw\0"`.
    pub name: &'static str,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// Hardware loop: sensors, bus, status tables.
pub const HARDWARE_TASK: TaskSpec = TaskSpec {
    core: Core::App,
    priority: 5,
    stack_kb: 16,
    name: "core1-hw\0",
};

/// Console reader feeding control text into the inbound channel.
pub const CONSOLE_TASK: TaskSpec = TaskSpec {
    core: Core::Pro,
    priority: 3,
    stack_kb: 8,
    name: "console\0",
};

/// Drains the outbound channel into the transport.
pub const TRANSPORT_TASK: TaskSpec = TaskSpec {
    core: Core::Pro,
    priority: 4,
    stack_kb: 8,
    name: "transport\0",
};

#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    // SAFETY: the config is consumed by the spawn below on this same thread.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as i32;
        cfg.thread_name = spec.name.as_ptr() as *const _;
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK as i32 {
        return Err(std::io::Error::other(format!(
            "esp_pthread_set_cfg failed for {}: {}",
            spec.display_name(),
            ret
        )));
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
}

#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
}
