//! 在 soft 后端上运行剔除管线
//!
//! 用法：`headless_cull [settings.toml]`

use std::path::PathBuf;

use anyhow::Context;
use ash::vk;
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;

use sieve_crate_tools::init_log::init_log;
use sieve_gfx::commands::command_buffer::GfxCommandBuffer;
use sieve_gfx::device::GfxDevice;
use sieve_gfx::frame_counter::FrameCounter;
use sieve_gfx::resources::buffer::GfxBufferDesc;
use sieve_gfx::soft::device::SoftDevice;
use sieve_gpu_culling::soft_kernels::register_soft_kernels;
use sieve_gpu_culling::{CullingSettings, FrameRenderData, GpuCulling, LightId, ShadowLight};
use sieve_render_graph::{RenderGraphBuilder, RgBufferState, RgPassKind, RgTransientPool};

mod scene;

use scene::ProceduralScene;

const FRAME_COUNT: u64 = 10;
const DRAWABLE_COUNT: usize = 2000;

/// 每一帧的光源：lamp 2 在第 3 帧加入，lamp 1 在第 6 帧移除，太阳在第 5 帧增加一个 cascade
fn lights_for_frame(frame_idx: u64) -> Vec<ShadowLight> {
    let mut lights = vec![scene::sun(LightId(0), if frame_idx < 5 { 3 } else { 4 })];
    if frame_idx < 6 {
        lights.push(scene::lamp(LightId(1), Vec3::new(10.0, 20.0, 5.0)));
    }
    if frame_idx >= 3 {
        lights.push(scene::lamp(LightId(2), Vec3::new(-15.0, 20.0, -10.0)));
    }
    lights
}

fn load_settings() -> anyhow::Result<CullingSettings> {
    match std::env::args().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            log::info!("load culling settings from {}", path.display());
            CullingSettings::load(&path)
        }
        None => Ok(CullingSettings::default()),
    }
}

fn main() -> anyhow::Result<()> {
    init_log();

    let settings = load_settings().context("failed to start headless_cull")?;
    anyhow::ensure!(
        DRAWABLE_COUNT <= settings.max_draws as usize,
        "the demo scene needs max_draws >= {DRAWABLE_COUNT}, got {}",
        settings.max_draws
    );
    log::info!("settings: {settings:?}");

    let mut device = SoftDevice::new();
    register_soft_kernels(&mut device);
    let mut culling = GpuCulling::new(&mut device, &settings);
    let mut transient_pool = RgTransientPool::new(settings.transient_idle_frames);
    let mut frame_counter = FrameCounter::new(0);

    let index_buffer = device.create_buffer(
        &GfxBufferDesc::new(1 << 20, vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST),
        "scene-index-buffer",
    );
    let vertex_buffer = device.create_buffer(
        &GfxBufferDesc::new(1 << 20, vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST),
        "scene-vertex-buffer",
    );
    let mut rng = StdRng::seed_from_u64(0x51e7e);
    let mut scene = ProceduralScene::new(&mut rng, DRAWABLE_COUNT, index_buffer, vertex_buffer);

    for frame_idx in 0..FRAME_COUNT {
        let _span = tracy_client::span!("frame");
        scene.update();
        let lights = lights_for_frame(frame_idx);
        let frame = FrameRenderData {
            drawables: &scene.drawables,
            camera: scene::orbit_camera(frame_idx),
            shadow_lights: &lights,
        };

        let mut graph = RenderGraphBuilder::new();
        let outputs = culling.build_frame(&mut device, &frame, &frame_counter, &mut graph);
        for bucket in outputs.buckets.clone() {
            graph.add_pass(
                format!("{}/draw", bucket.bucket),
                RgPassKind::Graphics,
                |builder| {
                    builder.read_buffer(bucket.indirect_sort_buffer, RgBufferState::INDIRECT_BUFFER);
                    bucket
                },
                |bucket, ctx| bucket.record_draw(ctx),
            );
        }
        let compiled = graph.compile();
        if frame_idx == 0 {
            compiled.print_execution_plan();
        }

        let cmd = GfxCommandBuffer::new(&frame_counter.frame_name());
        cmd.begin();
        compiled.execute(&cmd, &mut transient_pool, &mut device);
        cmd.end();
        device.submit(cmd);

        culling.end_frame(&mut device, &compiled, &outputs, &frame_counter);
        transient_pool.end_frame(&mut device);

        let report = &outputs.report;
        if !report.is_unchanged() {
            log::info!(
                "{} lights: [{}], allocated {}, released {}",
                frame_counter.frame_name(),
                lights.iter().map(scene::describe).collect::<Vec<_>>().join(", "),
                report.allocated.len(),
                report.released.len()
            );
        }

        let stats = device.take_stats();
        for (bucket, draw) in outputs.buckets.iter().zip(&stats.draw_calls) {
            log::info!("{} {:<20} draws {:>5}", frame_counter.frame_name(), bucket.bucket.to_string(), draw.count);
        }
        log::info!(
            "{} dispatches {}, workgroups {}, barrier batches {}",
            frame_counter.frame_name(),
            stats.total_dispatches(),
            stats.executed_groups,
            stats.barrier_batches
        );

        frame_counter.next_frame();
    }

    transient_pool.destroy(&mut device);
    culling.destroy(&mut device);
    device.destroy_buffer(index_buffer);
    device.destroy_buffer(vertex_buffer);
    anyhow::ensure!(device.buffer_count() == 0, "{} buffers leaked", device.buffer_count());

    Ok(())
}
