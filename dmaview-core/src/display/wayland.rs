//! Wayland backend: registry, xdg-shell window, dmabuf import, shm demo

use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use tracing::{debug, info, trace, warn};
use wayland_client::backend::{Backend, ObjectId, WaylandError};
use wayland_client::protocol::{
    wl_buffer, wl_compositor, wl_region, wl_registry, wl_shm, wl_shm_pool, wl_surface,
};
use wayland_client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle, delegate_noop, event_created_child,
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::{
    zwp_linux_buffer_params_v1::{self, ZwpLinuxBufferParamsV1},
    zwp_linux_dmabuf_v1::{self, ZwpLinuxDmabufV1},
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

use super::shm::ShmPixels;
use super::surface::{SurfaceOps, WindowResource, WindowSurface};
use super::{DisplayBackend, DisplayEvent};
use crate::error::{DmaviewError, Result};
use crate::formats::fourcc_to_string;
use crate::import::{DmabufImporter, FormatTable, ImportParams, RequestId};
use crate::types::Resolution;

/// Shm buffers used by the demo, so one can be drawn while the other is held
const SHM_SLOTS: usize = 2;

/// What a wl_buffer was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferRole {
    Dmabuf,
    Shm(usize),
}

/// State touched by protocol callbacks
#[derive(Default)]
struct WaylandState {
    compositor: Option<wl_compositor::WlCompositor>,
    wm_base: Option<xdg_wm_base::XdgWmBase>,
    dmabuf: Option<ZwpLinuxDmabufV1>,
    shm: Option<wl_shm::WlShm>,
    /// Registry name -> interface, for logging removals
    globals: HashMap<u32, String>,
    /// Imported wl_buffers -> the request that produced them
    imported: HashMap<ObjectId, RequestId>,
    shm_busy: [bool; SHM_SLOTS],
    events: VecDeque<DisplayEvent<wl_buffer::WlBuffer>>,
}

/// One demo shm buffer
struct ShmSlot {
    pixels: ShmPixels,
    pool: wl_shm_pool::WlShmPool,
    buffer: wl_buffer::WlBuffer,
}

impl ShmSlot {
    fn destroy(self) {
        self.buffer.destroy();
        self.pool.destroy();
    }
}

/// A connection to the compositor plus the window built on it
pub struct WaylandDisplay {
    connection: Connection,
    backend: Backend,
    queue: EventQueue<WaylandState>,
    qh: QueueHandle<WaylandState>,
    state: WaylandState,
    surface: Option<wl_surface::WlSurface>,
    xdg_surface: Option<xdg_surface::XdgSurface>,
    toplevel: Option<xdg_toplevel::XdgToplevel>,
    shm_slots: [Option<ShmSlot>; SHM_SLOTS],
    opaque: bool,
}

impl WaylandDisplay {
    /// Connect using `WAYLAND_DISPLAY` and bind the globals we use
    ///
    /// Performs one round trip. Fails when the compositor offers no
    /// `wl_compositor` or `xdg_wm_base`.
    pub fn connect() -> Result<Self> {
        let connection = Connection::connect_to_env()?;
        let backend = connection.backend();
        let mut queue = connection.new_event_queue();
        let qh = queue.handle();

        connection.display().get_registry(&qh, ());

        let mut state = WaylandState::default();
        queue.roundtrip(&mut state).map_err(|e| {
            DmaviewError::DisplayConnectionFailed(format!("initial roundtrip failed: {}", e))
        })?;

        if state.compositor.is_none() {
            return Err(DmaviewError::DisplayConnectionFailed(
                "compositor does not offer wl_compositor".to_string(),
            ));
        }
        if state.wm_base.is_none() {
            return Err(DmaviewError::DisplayConnectionFailed(
                "compositor does not offer xdg_wm_base".to_string(),
            ));
        }
        if state.dmabuf.is_none() {
            warn!("Compositor does not offer zwp_linux_dmabuf_v1; imports will fail");
        }

        info!("Connected to Wayland display ({} globals)", state.globals.len());

        Ok(Self {
            connection,
            backend,
            queue,
            qh,
            state,
            surface: None,
            xdg_surface: None,
            toplevel: None,
            shm_slots: Default::default(),
            opaque: true,
        })
    }

    /// Whether dmabuf import is available
    pub fn supports_dmabuf(&self) -> bool {
        self.state.dmabuf.is_some()
    }

    /// Block until the compositor has processed everything we sent
    pub fn roundtrip(&mut self) -> Result<()> {
        self.queue.roundtrip(&mut self.state)?;
        Ok(())
    }

    /// Collect the format/modifier advertisement
    ///
    /// Any other events received meanwhile stay queued for the next
    /// [`DisplayBackend::dispatch_pending`].
    pub fn collect_formats(&mut self) -> Result<FormatTable> {
        self.roundtrip()?;

        let mut table = FormatTable::new();
        for event in &self.state.events {
            if let DisplayEvent::FormatAdvertised {
                format,
                modifier_hi,
                modifier_lo,
            } = event
            {
                table.insert(
                    *format,
                    crate::formats::join_modifier(*modifier_hi, *modifier_lo),
                );
            }
        }
        Ok(table)
    }

    /// Create the surface and toplevel, and make the initial commit
    pub fn create_window(&mut self, title: &str, opaque: bool, window: &mut WindowSurface) -> Result<()> {
        let compositor = self.state.compositor.as_ref().ok_or_else(|| {
            DmaviewError::SurfaceCreationFailed("no wl_compositor bound".to_string())
        })?;
        let wm_base = self.state.wm_base.as_ref().ok_or_else(|| {
            DmaviewError::SurfaceCreationFailed("no xdg_wm_base bound".to_string())
        })?;

        let surface = compositor.create_surface(&self.qh, ());
        window.record_created(WindowResource::Surface);

        let xdg_surface = wm_base.get_xdg_surface(&surface, &self.qh, ());
        window.record_created(WindowResource::XdgSurface);

        let toplevel = xdg_surface.get_toplevel(&self.qh, ());
        toplevel.set_title(title.to_string());
        toplevel.set_app_id("dmaview".to_string());
        window.record_created(WindowResource::Toplevel);

        self.surface = Some(surface);
        self.xdg_surface = Some(xdg_surface);
        self.toplevel = Some(toplevel);
        self.opaque = opaque;

        self.set_opaque_region(window.size());
        if let Some(surface) = &self.surface {
            surface.commit();
        }

        // A refused window shows up as a protocol error on this round trip;
        // the configure events it brings stay queued for the loop
        self.roundtrip().map_err(creation_failed)?;

        info!("Created window '{}' at {}", title, window.size());
        Ok(())
    }

    fn set_opaque_region(&self, size: Resolution) {
        let (Some(surface), Some(compositor)) = (&self.surface, &self.state.compositor) else {
            return;
        };
        if !self.opaque {
            surface.set_opaque_region(None);
            return;
        }

        let region = compositor.create_region(&self.qh, ());
        region.add(0, 0, size.width as i32, size.height as i32);
        surface.set_opaque_region(Some(&region));
        region.destroy();
    }

    fn flush(&self) -> Result<()> {
        match self.connection.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn damage_and_commit(&self, surface: &wl_surface::WlSurface, size: Resolution) {
        if surface.version() >= 4 {
            surface.damage_buffer(0, 0, size.width as i32, size.height as i32);
        } else {
            surface.damage(0, 0, size.width as i32, size.height as i32);
        }
        surface.commit();
    }

    /// A free shm slot at `size`, created or recreated as needed
    fn shm_slot(&mut self, size: Resolution) -> Result<Option<usize>> {
        let Some(index) = (0..SHM_SLOTS).find(|&i| !self.state.shm_busy[i]) else {
            return Ok(None);
        };

        let stale = self.shm_slots[index]
            .as_ref()
            .is_some_and(|slot| slot.pixels.size() != size);
        if stale {
            if let Some(slot) = self.shm_slots[index].take() {
                slot.destroy();
            }
        }

        if self.shm_slots[index].is_none() {
            let shm = self
                .state
                .shm
                .as_ref()
                .ok_or_else(|| DmaviewError::display("compositor does not offer wl_shm"))?;
            let pixels = ShmPixels::new(size)?;
            let pool = shm.create_pool(pixels.as_fd(), pixels.len() as i32, &self.qh, ());
            let buffer = pool.create_buffer(
                0,
                size.width as i32,
                size.height as i32,
                pixels.stride() as i32,
                wl_shm::Format::Xrgb8888,
                &self.qh,
                BufferRole::Shm(index),
            );
            debug!("Created shm buffer {} at {}", index, size);
            self.shm_slots[index] = Some(ShmSlot {
                pixels,
                pool,
                buffer,
            });
        }

        Ok(Some(index))
    }
}

/// Errors while building the window count as surface creation failures
fn creation_failed(err: DmaviewError) -> DmaviewError {
    match err {
        DmaviewError::SurfaceCreationFailed(_) => err,
        other => DmaviewError::SurfaceCreationFailed(other.to_string()),
    }
}

impl SurfaceOps for WaylandDisplay {
    fn ack_configure(&mut self, serial: u32) {
        if let Some(xdg_surface) = &self.xdg_surface {
            trace!("ack_configure {}", serial);
            xdg_surface.ack_configure(serial);
        }
    }

    fn resize(&mut self, size: Resolution) {
        self.set_opaque_region(size);
    }

    fn commit(&mut self) {
        if let Some(surface) = &self.surface {
            surface.commit();
        }
    }

    fn release(&mut self, resource: WindowResource) {
        match resource {
            WindowResource::Toplevel => {
                if let Some(toplevel) = self.toplevel.take() {
                    toplevel.destroy();
                }
            }
            WindowResource::XdgSurface => {
                if let Some(xdg_surface) = self.xdg_surface.take() {
                    xdg_surface.destroy();
                }
            }
            WindowResource::Surface => {
                if let Some(surface) = self.surface.take() {
                    surface.destroy();
                }
            }
        }
    }
}

impl DmabufImporter for WaylandDisplay {
    type Buffer = wl_buffer::WlBuffer;

    fn submit(&mut self, id: RequestId, params: &ImportParams) -> Result<()> {
        let dmabuf = self
            .state
            .dmabuf
            .as_ref()
            .ok_or_else(|| DmaviewError::display("compositor does not offer zwp_linux_dmabuf_v1"))?;

        let request = dmabuf.create_params(&self.qh, id);
        for plane in &params.planes {
            let (hi, lo) = plane.modifier_parts();
            debug!(
                "Import {}: plane {} fd {} offset {} stride {}",
                id,
                plane.plane_index,
                plane.handle.as_fd().as_raw_fd(),
                plane.offset,
                plane.stride
            );
            request.add(plane.handle.as_fd(), plane.plane_index, plane.offset, plane.stride, hi, lo);
        }
        request.create(
            params.resolution.width as i32,
            params.resolution.height as i32,
            params.format,
            zwp_linux_buffer_params_v1::Flags::empty(),
        );

        self.flush()
    }
}

impl DisplayBackend for WaylandDisplay {
    fn dispatch_pending(&mut self) -> Result<Vec<DisplayEvent<wl_buffer::WlBuffer>>> {
        self.flush()?;

        if let Some(guard) = self.queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.queue.dispatch_pending(&mut self.state)?;

        Ok(self.state.events.drain(..).collect())
    }

    fn attach(&mut self, buffer: &wl_buffer::WlBuffer, size: Resolution) -> Result<()> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| DmaviewError::display("no surface to attach to"))?;
        surface.attach(Some(buffer), 0, 0);
        self.damage_and_commit(surface, size);
        self.flush()
    }

    fn present_color(&mut self, rgb: [u8; 3], size: Resolution) -> Result<bool> {
        let Some(index) = self.shm_slot(size)? else {
            trace!("Both shm buffers busy, skipping frame");
            return Ok(false);
        };
        let (Some(slot), Some(surface)) = (self.shm_slots[index].as_mut(), self.surface.as_ref()) else {
            return Ok(false);
        };

        slot.pixels.fill(rgb);
        surface.attach(Some(&slot.buffer), 0, 0);
        self.state.shm_busy[index] = true;
        self.damage_and_commit(surface, size);
        self.flush()?;
        Ok(true)
    }

    fn destroy_buffer(&mut self, buffer: wl_buffer::WlBuffer) {
        self.state.imported.remove(&buffer.id());
        buffer.destroy();
    }

    fn disconnect(&mut self) {
        for slot in self.shm_slots.iter_mut().filter_map(Option::take) {
            slot.destroy();
        }
        if let Err(e) = self.flush() {
            warn!("Final flush failed: {}", e);
        }
        info!("Disconnected from Wayland display");
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.backend.poll_fd())
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for WaylandState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                trace!("Global {} {} v{}", name, interface, version);
                match interface.as_str() {
                    "wl_compositor" => {
                        state.compositor = Some(registry.bind(name, version.min(4), qh, ()));
                    }
                    "xdg_wm_base" => {
                        state.wm_base = Some(registry.bind(name, version.min(2), qh, ()));
                    }
                    "zwp_linux_dmabuf_v1" => {
                        state.dmabuf = Some(registry.bind(name, version.min(3), qh, ()));
                    }
                    "wl_shm" => {
                        state.shm = Some(registry.bind(name, version.min(1), qh, ()));
                    }
                    _ => {}
                }
                state.globals.insert(name, interface);
            }
            wl_registry::Event::GlobalRemove { name } => {
                if let Some(interface) = state.globals.remove(&name) {
                    debug!("Global {} ({}) removed", name, interface);
                }
                state.events.push_back(DisplayEvent::GlobalRemoved { name });
            }
            _ => {}
        }
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for WaylandState {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.events.push_back(DisplayEvent::SurfaceConfigure { serial });
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                state
                    .events
                    .push_back(DisplayEvent::ToplevelConfigure { width, height });
            }
            xdg_toplevel::Event::Close => {
                state.events.push_back(DisplayEvent::CloseRequested);
            }
            _ => {}
        }
    }
}

impl Dispatch<ZwpLinuxDmabufV1, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &ZwpLinuxDmabufV1,
        event: zwp_linux_dmabuf_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwp_linux_dmabuf_v1::Event::Format { format } => {
                trace!("dmabuf format {}", fourcc_to_string(format));
            }
            zwp_linux_dmabuf_v1::Event::Modifier {
                format,
                modifier_hi,
                modifier_lo,
            } => {
                state.events.push_back(DisplayEvent::FormatAdvertised {
                    format,
                    modifier_hi,
                    modifier_lo,
                });
            }
            _ => {}
        }
    }
}

impl Dispatch<ZwpLinuxBufferParamsV1, RequestId> for WaylandState {
    fn event(
        state: &mut Self,
        params: &ZwpLinuxBufferParamsV1,
        event: zwp_linux_buffer_params_v1::Event,
        request: &RequestId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwp_linux_buffer_params_v1::Event::Created { buffer } => {
                state.imported.insert(buffer.id(), *request);
                state.events.push_back(DisplayEvent::ImportCreated {
                    request: *request,
                    buffer,
                });
                params.destroy();
            }
            zwp_linux_buffer_params_v1::Event::Failed => {
                state
                    .events
                    .push_back(DisplayEvent::ImportFailed { request: *request });
                params.destroy();
            }
            _ => {}
        }
    }

    event_created_child!(WaylandState, ZwpLinuxBufferParamsV1, [
        zwp_linux_buffer_params_v1::EVT_CREATED_OPCODE => (wl_buffer::WlBuffer, BufferRole::Dmabuf),
    ]);
}

impl Dispatch<wl_buffer::WlBuffer, BufferRole> for WaylandState {
    fn event(
        state: &mut Self,
        buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        role: &BufferRole,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            match role {
                BufferRole::Dmabuf => {
                    if let Some(request) = state.imported.get(&buffer.id()) {
                        state
                            .events
                            .push_back(DisplayEvent::BufferReleased { request: *request });
                    }
                }
                BufferRole::Shm(index) => {
                    state.shm_busy[*index] = false;
                }
            }
        }
    }
}

delegate_noop!(WaylandState: wl_compositor::WlCompositor);
delegate_noop!(WaylandState: wl_region::WlRegion);
delegate_noop!(WaylandState: wl_shm_pool::WlShmPool);
delegate_noop!(WaylandState: ignore wl_surface::WlSurface);
delegate_noop!(WaylandState: ignore wl_shm::WlShm);
