use ash::vk;
use ash_bringup::{Bootstrap, BootstrapConfig, LastSuitable, WindowSurface};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, StartCause, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("Vulkan")
        .with_inner_size(PhysicalSize::new(1920, 1080))
        .build(&event_loop)
        .unwrap();

    let config = BootstrapConfig::new()
        .app_name("Hello Triangle")
        .unwrap()
        .engine_name("My Engine")
        .unwrap();

    let bootstrap = {
        let provider = WindowSurface::new(&window, || {
            let size = window.inner_size();
            vk::Extent2D {
                width: size.width,
                height: size.height,
            }
        });
        Bootstrap::load(&config, &provider, &LastSuitable)
    };
    let mut bootstrap = match bootstrap {
        Ok(bootstrap) => bootstrap,
        Err(err) => {
            log::error!("bring-up failed ({:?}): {err}", err.kind());
            std::process::exit(1);
        }
    };

    if let Err(err) = bootstrap.create_swapchain() {
        log::error!("swapchain creation failed ({:?}): {err}", err.kind());
        drop(bootstrap);
        std::process::exit(1);
    }

    log::info!("selected {}", bootstrap.physical_device().name());
    log::info!("{:?}", bootstrap.queues());
    log::info!("{:?}", bootstrap.swapchain_config());
    log::info!("acquired: {:?}", bootstrap.acquired().collect::<Vec<_>>());

    let mut bootstrap = Some(bootstrap);
    event_loop.run(move |event, _, control_flow| match event {
        Event::NewEvents(StartCause::Init) => *control_flow = ControlFlow::Wait,
        Event::WindowEvent {
            event:
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            ..
                        },
                    ..
                },
            window_id,
        } if window_id == window.id() => {
            // Swapchain, device, surface, messenger, instance.
            bootstrap.take();
            *control_flow = ControlFlow::Exit;
        }
        _ => (),
    });
}
