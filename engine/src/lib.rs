#![allow(clippy::too_many_arguments, clippy::unnecessary_wraps)]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use log::*;
use renderer::Renderer;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

mod config;
mod renderer;
mod vulkan;

pub use config::EngineConfig;
pub use vulkan::SwapchainPreferences;

pub struct Engine {
    window: Window,
    renderer: Renderer,
    event_loop: EventLoop<()>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Engine> {
        // Window
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.window_width, config.window_height))
            .build(&event_loop)?;

        let renderer = unsafe { Renderer::create(&window, config)? };

        Ok(Engine {
            window,
            renderer,
            event_loop,
        })
    }

    pub fn run(self) -> Result<()> {
        let Engine {
            window,
            mut renderer,
            event_loop,
        } = self;

        let mut minimized = false;
        let mut destroyed = false;
        // Render-loop failures happen inside the winit closure; they are
        // stashed here and surfaced once the loop has wound down.
        let failure: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));
        let loop_failure = Rc::clone(&failure);

        event_loop.run(move |event, elwt| {
            match event {
                // Request a redraw when all events were processed.
                Event::AboutToWait => window.request_redraw(),
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::RedrawRequested if !elwt.exiting() && !minimized && !destroyed => {
                        if let Err(err) = unsafe { renderer.render(&window) } {
                            error!("Render loop aborted: {:?}", err);
                            *loop_failure.borrow_mut() = Some(err);
                            elwt.exit();
                            unsafe { renderer.destroy() };
                            destroyed = true;
                        }
                    }
                    WindowEvent::Resized(size) => {
                        // A zero-sized framebuffer means minimized; pause
                        // rendering until the window comes back.
                        if size.width == 0 || size.height == 0 {
                            minimized = true;
                        } else {
                            minimized = false;
                            renderer.mark_resized();
                        }
                    }
                    WindowEvent::CloseRequested => {
                        elwt.exit();
                        if !destroyed {
                            unsafe { renderer.destroy() };
                            destroyed = true;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        })?;

        let failure = failure.borrow_mut().take();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
