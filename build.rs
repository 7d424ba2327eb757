//! Build script for framesync.
//!
//! Reports which optional backends and integrations are compiled in, and
//! points at the knobs that matter for release builds.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_VULKAN");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");

    let vulkan_enabled = env::var("CARGO_FEATURE_VULKAN").is_ok();
    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Backends
    // =========================================================================

    if vulkan_enabled {
        emit_info("Vulkan backend enabled (ash)");
        emit_note("Dual-queue mode needs a compute queue family separate from graphics");
        emit_note("and VK_KHR_timeline_semaphore (core in Vulkan 1.2). Check first:");
        emit_note("  let families = framesync::device::vulkan::find_queue_families(&instance, pd);");
        emit_note("Devices without them still run SingleQueue mode.");
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    if log_enabled {
        emit_info("log integration enabled: FS diagnostics are forwarded to the `log` crate");
    }

    if diagnostics_enabled {
        emit_info("Diagnostics enabled in every build profile");
        if is_release {
            emit_note("FS1xx host-wait notes print every time a frame blocks on the GPU.");
            emit_note("Silence them with framesync::diagnostics::suppress_diagnostics(true).");
        }
    } else if is_release && !log_enabled {
        emit_note("FS diagnostics are compiled out of release builds.");
        emit_note("Enable 'log' or 'diagnostics' to keep them:");
        emit_note("  framesync = { version = \"0.1\", features = [\"log\"] }");
    }

    // =========================================================================
    // Release build recommendations
    // =========================================================================

    if is_release {
        emit_info("Building in release mode");

        if parking_lot_enabled {
            emit_info("Using parking_lot for mutexes");
        } else {
            emit_note("Tip: 'parking_lot' makes the simulated device and Vulkan queue locks cheaper:");
            emit_note("  framesync = { version = \"0.1\", features = [\"parking_lot\"] }");
        }

        emit_separator();
        emit_info("framesync Quick Reference");
        emit_separator();
        emit_note("Per frame:");
        emit_note("  let report = scheduler.run_frame(&jobs, &mut recorder)?;");
        emit_note("");
        emit_note("Between frames:");
        emit_note("  scheduler.set_batch_size(6)?;");
        emit_note("  scheduler.set_mode(QueueMode::SingleQueue)?;");
        emit_note("  scheduler.replace_kernel(&mut compiler, \"sin(x) * y\")?;");
        emit_separator();
    }

    check_target();
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[framesync] ℹ️  {}", msg);
}

fn emit_note(msg: &str) {
    if msg.is_empty() {
        println!("cargo:warning=[framesync]");
    } else {
        println!("cargo:warning=[framesync]    {}", msg);
    }
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[framesync] ⚠️  {}", msg);
}

fn emit_separator() {
    println!("cargo:warning=[framesync] ────────────────────────────────────────");
}

// =============================================================================
// Environment checks
// =============================================================================

fn check_target() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("wasm") && env::var("CARGO_FEATURE_VULKAN").is_ok() {
        emit_warning("The Vulkan backend is not available on WebAssembly targets");
        emit_note("Use the simulated device, or drop the 'vulkan' feature.");
    }

    if target.contains("apple") && env::var("CARGO_FEATURE_VULKAN").is_ok() {
        emit_note("macOS/iOS: Vulkan runs through MoltenVK, which exposes a single queue family.");
        emit_note("Expect FS003 and plan for SingleQueue mode.");
    }
}
