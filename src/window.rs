//! Window and Event Loop Management
//!
//! Bridges winit to the [`App`]: pointer input is mapped into canvas
//! coordinates and queued, session events arrive as winit user events, and
//! the actions they produce are handed back to the [`Session`].

use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::renderer::Viewport;
use crate::session::{EventSink, Session, SessionEvent};
use crate::{App, PointerEvent, Renderer};

const TITLE: &str = "Sketch Loop";

/// Posts session events into the winit event loop
pub struct ProxySink(EventLoopProxy<SessionEvent>);

impl ProxySink {
    pub fn new(proxy: EventLoopProxy<SessionEvent>) -> Self {
        Self(proxy)
    }
}

impl EventSink for ProxySink {
    fn send(&self, event: SessionEvent) -> bool {
        self.0.send_event(event).is_ok()
    }
}

/// Keyboard shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ResetCanvas,
    ToggleSync,
    Quit,
}

impl Command {
    pub fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Escape) => Some(Self::Quit),
            Key::Named(NamedKey::Space) => Some(Self::ToggleSync),
            Key::Character(c) if c.eq_ignore_ascii_case("r") => Some(Self::ResetCanvas),
            _ => None,
        }
    }
}

/// Wrapper for the application window and state
pub struct AppWrapper {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    app: App,
    session: Session,
    /// Last pointer position in canvas coordinates
    cursor: Option<[f32; 2]>,
    title_revision: Option<u64>,
    /// Set when window or renderer creation failed and the loop exited
    startup_error: Option<anyhow::Error>,
}

impl AppWrapper {
    pub fn new(app: App, session: Session) -> Self {
        Self {
            window: None,
            renderer: None,
            app,
            session,
            cursor: None,
            title_revision: None,
            startup_error: None,
        }
    }

    /// Error that stopped the event loop during startup, if any
    pub fn take_startup_error(&mut self) -> Option<anyhow::Error> {
        self.startup_error.take()
    }

    fn fail_startup(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.startup_error = Some(error);
        event_loop.exit();
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn viewport(&self) -> Viewport {
        match (&self.renderer, &self.window) {
            (Some(renderer), _) => renderer.viewport(),
            (None, Some(window)) => {
                let size = window.inner_size();
                Viewport::fit(self.app.canvas().dimensions(), (size.width, size.height))
            }
            (None, None) => Viewport::fit(self.app.canvas().dimensions(), self.app.canvas().dimensions()),
        }
    }

    fn queue_pointer(&mut self, event: PointerEvent) {
        self.app.queue_input_event(event);
        self.request_redraw();
    }

    fn sync_title(&mut self) {
        let prompt = self.app.prompt();
        if self.title_revision == Some(prompt.revision()) {
            return;
        }
        if let Some(window) = &self.window {
            window.set_title(&format!("{} - {}", TITLE, prompt.as_str()));
            self.title_revision = Some(prompt.revision());
        }
    }

    fn run_command(&mut self, event_loop: &ActiveEventLoop, command: Command) {
        match command {
            Command::ResetCanvas => {
                self.app.reset_canvas();
                self.request_redraw();
            }
            Command::ToggleSync => {
                self.app.toggle_sync_paused();
            }
            Command::Quit => {
                log::info!("Escape pressed, exiting");
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler<SessionEvent> for AppWrapper {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let (width, height) = self.app.canvas().dimensions();
        let window_attributes = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(PhysicalSize::new(width, height));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail_startup(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };
        log::info!("Window created: {:?}", window.inner_size());

        // Block on async initialization; there is nothing to show until it's done
        match pollster::block_on(Renderer::new(window.clone(), window.inner_size(), (width, height))) {
            Ok(mut renderer) => {
                renderer.upload_canvas(self.app.canvas().image());
                self.renderer = Some(renderer);
            }
            Err(e) => {
                self.fail_startup(event_loop, e.context("Failed to initialize renderer"));
                return;
            }
        }

        self.window = Some(window);
        self.sync_title();
        self.request_redraw();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: SessionEvent) {
        if let Some(action) = self.app.handle_session_event(event) {
            self.session.perform(action);
        }
        self.sync_title();
        self.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if physical_size.width == 0 || physical_size.height == 0 {
                    log::debug!("Ignoring resize to zero size: {:?}", physical_size);
                    return;
                }
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(physical_size);
                }
                self.request_redraw();
            }
            WindowEvent::CursorMoved { position, .. } => {
                let point = self.viewport().to_canvas(self.app.canvas().dimensions(), [position.x, position.y]);
                self.cursor = Some(point);
                self.queue_pointer(PointerEvent::moved(point[0], point[1]));
            }
            WindowEvent::CursorLeft { .. } => {
                if let Some([x, y]) = self.cursor.take() {
                    self.queue_pointer(PointerEvent::leave(x, y));
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let Some([x, y]) = self.cursor else {
                    return;
                };
                let event = match state {
                    ElementState::Pressed => PointerEvent::down(x, y),
                    ElementState::Released => PointerEvent::up(x, y),
                };
                self.queue_pointer(event);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                if let Some(command) = Command::from_key(&event.logical_key) {
                    self.run_command(event_loop, command);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = &mut self.renderer {
                    self.app.render(renderer);
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.app.shutdown();
        self.session.shutdown();
        log::info!("Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    #[test]
    fn test_proxy_sink_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<ProxySink>();
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(Command::from_key(&Key::Named(NamedKey::Escape)), Some(Command::Quit));
        assert_eq!(Command::from_key(&Key::Named(NamedKey::Space)), Some(Command::ToggleSync));
        assert_eq!(Command::from_key(&Key::Character(SmolStr::new("r"))), Some(Command::ResetCanvas));
        assert_eq!(Command::from_key(&Key::Character(SmolStr::new("R"))), Some(Command::ResetCanvas));
        assert_eq!(Command::from_key(&Key::Character(SmolStr::new("x"))), None);
        assert_eq!(Command::from_key(&Key::Named(NamedKey::Enter)), None);
    }
}
