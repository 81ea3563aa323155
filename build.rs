// build.rs

use std::process::Command;

fn compile(source: &str, output: &str) {
    match Command::new("glslc").args([source, "-o", output]).status() {
        Err(err) => {
            // glslc ships with the Vulkan SDK; without it the crate still
            // builds, but the renderer will fail at startup when it loads
            // the missing SPIR-V blobs.
            println!("cargo::warning=glslc not available ({err}), skipping {source}");
        }
        Ok(status) if !status.success() => {
            println!("cargo::warning=glslc failed on {source}: {status}");
        }
        Ok(_) => {}
    }
}

fn main() {
    compile("shaders/shader.vert", "shaders/vert.spv");
    compile("shaders/shader.frag", "shaders/frag.spv");

    println!("cargo::rerun-if-changed=shaders/shader.vert");
    println!("cargo::rerun-if-changed=shaders/shader.frag");
}
