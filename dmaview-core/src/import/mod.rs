//! DMA-BUF import bridge
//!
//! Turns exported capture buffers into compositor-side buffers through
//! `zwp_linux_dmabuf_v1`. The bridge owns the exported handles from the
//! moment an import is requested until the request fails or the bridge is
//! cleared, and it accumulates the compositor's format/modifier
//! advertisement.
//!
//! The protocol itself sits behind [`DmabufImporter`]; resolutions arrive
//! later through [`ImportBridge::on_created`] and [`ImportBridge::on_failed`].

mod formats;

pub use formats::FormatTable;

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::error::{DmaviewError, Result};
use crate::formats::{MOD_LINEAR, fourcc_to_string, split_modifier};
use crate::types::{ExportedBuffer, ExportedPlane, Resolution};

/// Identifies one import request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One plane of an import request
#[derive(Debug)]
pub struct ImportPlane {
    pub handle: ExportedPlane,
    pub plane_index: u32,
    pub offset: u32,
    pub stride: u32,
    pub modifier: u64,
}

impl ImportPlane {
    /// (hi, lo) halves of the modifier as sent on the wire
    pub fn modifier_parts(&self) -> (u32, u32) {
        split_modifier(self.modifier)
    }
}

/// Everything the compositor needs to build a buffer
#[derive(Debug)]
pub struct ImportParams {
    /// Capture buffer these planes belong to
    pub buffer: u32,
    pub resolution: Resolution,
    pub format: u32,
    pub planes: Vec<ImportPlane>,
}

/// Where an import request stands
#[derive(Debug)]
pub enum ImportStatus<B> {
    /// Submitted, no answer yet
    Pending,
    /// The compositor built a buffer
    Created(B),
    /// The compositor refused; handles are closed
    Failed,
    /// The compositor buffer was handed out for destruction
    Retired,
}

/// An import request and its resolution
#[derive(Debug)]
pub struct ImportRequest<B> {
    id: RequestId,
    params: ImportParams,
    status: ImportStatus<B>,
}

impl<B> ImportRequest<B> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Capture buffer index
    pub fn buffer_index(&self) -> u32 {
        self.params.buffer
    }

    pub fn params(&self) -> &ImportParams {
        &self.params
    }

    pub fn status(&self) -> &ImportStatus<B> {
        &self.status
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ImportStatus::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ImportStatus::Failed)
    }

    /// The compositor buffer, once created
    pub fn surface_buffer(&self) -> Option<&B> {
        match &self.status {
            ImportStatus::Created(buffer) => Some(buffer),
            _ => None,
        }
    }
}

/// Protocol side of an import
pub trait DmabufImporter {
    /// Compositor buffer handle produced by a successful import
    type Buffer;

    /// Send a parameter set and ask for a buffer
    ///
    /// Must not block; the answer is delivered later, keyed by `id`.
    fn submit(&mut self, id: RequestId, params: &ImportParams) -> Result<()>;
}

/// Tracks import requests and the compositor's format advertisement
#[derive(Debug)]
pub struct ImportBridge<B> {
    formats: FormatTable,
    requests: BTreeMap<RequestId, ImportRequest<B>>,
    next_id: u64,
}

impl<B> Default for ImportBridge<B> {
    fn default() -> Self {
        Self {
            formats: FormatTable::default(),
            requests: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<B> ImportBridge<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one (format, modifier) pair from the compositor
    pub fn on_format_advertised(&mut self, format: u32, modifier_hi: u32, modifier_lo: u32) {
        let modifier = crate::formats::join_modifier(modifier_hi, modifier_lo);
        if self.formats.insert(format, modifier) {
            debug!(
                "Compositor supports {} with modifier {:#018x}",
                fourcc_to_string(format),
                modifier
            );
        }
    }

    /// Everything advertised so far
    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    /// Ask the compositor to import one capture buffer
    ///
    /// Each plane goes in with its own handle, offset 0, the linear
    /// modifier, and `stride` (the device's plane 0 stride).
    ///
    /// On a submit error the handles are closed and no request is kept.
    pub fn request_import<I>(
        &mut self,
        importer: &mut I,
        exported: ExportedBuffer,
        resolution: Resolution,
        format: u32,
        stride: u32,
    ) -> Result<RequestId>
    where
        I: DmabufImporter<Buffer = B>,
    {
        if !self.formats.is_empty() && !self.formats.supports(format, MOD_LINEAR) {
            warn!(
                "Compositor did not advertise {} with a linear modifier; import may fail",
                fourcc_to_string(format)
            );
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;

        let buffer = exported.index;
        let planes = exported
            .planes
            .into_iter()
            .enumerate()
            .map(|(i, handle)| ImportPlane {
                handle,
                plane_index: i as u32,
                offset: 0,
                stride,
                modifier: MOD_LINEAR,
            })
            .collect();

        let params = ImportParams {
            buffer,
            resolution,
            format,
            planes,
        };

        importer.submit(id, &params)?;
        debug!(
            "Import {} submitted for buffer {} ({} planes, {} {})",
            id,
            buffer,
            params.planes.len(),
            fourcc_to_string(format),
            resolution
        );

        self.requests.insert(
            id,
            ImportRequest {
                id,
                params,
                status: ImportStatus::Pending,
            },
        );
        Ok(id)
    }

    /// The compositor built a buffer for `id`
    ///
    /// Returns the capture buffer index, or hands the buffer back if the
    /// request is unknown or already resolved.
    pub fn on_created(&mut self, id: RequestId, buffer: B) -> std::result::Result<u32, B> {
        match self.requests.get_mut(&id) {
            Some(request) if request.is_pending() => {
                request.status = ImportStatus::Created(buffer);
                info!("Import {} created a buffer for capture buffer {}", id, request.params.buffer);
                Ok(request.params.buffer)
            }
            _ => {
                warn!("Import {} resolved twice or never requested", id);
                Err(buffer)
            }
        }
    }

    /// The compositor refused `id`
    ///
    /// Closes the request's handles. Returns the capture buffer index, which
    /// stays undisplayable from here on.
    pub fn on_failed(&mut self, id: RequestId) -> Option<u32> {
        let request = self.requests.get_mut(&id)?;
        if !request.is_pending() {
            warn!("Import {} resolved twice", id);
            return None;
        }

        request.status = ImportStatus::Failed;
        request.params.planes.clear();
        let buffer = request.params.buffer;
        error!("{}", DmaviewError::ImportFailed { buffer });
        Some(buffer)
    }

    pub fn request(&self, id: RequestId) -> Option<&ImportRequest<B>> {
        self.requests.get(&id)
    }

    /// Latest request for a capture buffer
    pub fn request_for_buffer(&self, buffer: u32) -> Option<&ImportRequest<B>> {
        self.requests
            .values()
            .rev()
            .find(|r| r.params.buffer == buffer)
    }

    /// Capture buffer index behind a request
    pub fn buffer_for(&self, id: RequestId) -> Option<u32> {
        self.requests.get(&id).map(|r| r.params.buffer)
    }

    /// Compositor buffer for a capture buffer, if its import succeeded
    pub fn surface_for(&self, buffer: u32) -> Option<&B> {
        self.request_for_buffer(buffer)
            .and_then(|r| r.surface_buffer())
    }

    pub fn requests(&self) -> impl Iterator<Item = &ImportRequest<B>> {
        self.requests.values()
    }

    pub fn pending_count(&self) -> usize {
        self.requests.values().filter(|r| r.is_pending()).count()
    }

    pub fn created_count(&self) -> usize {
        self.requests
            .values()
            .filter(|r| r.surface_buffer().is_some())
            .count()
    }

    /// Move every created compositor buffer out, keeping the handles
    pub fn take_buffers(&mut self) -> Vec<(u32, B)> {
        let mut taken = Vec::new();
        for request in self.requests.values_mut() {
            if let ImportStatus::Created(_) = request.status {
                if let ImportStatus::Created(buffer) =
                    std::mem::replace(&mut request.status, ImportStatus::Retired)
                {
                    taken.push((request.params.buffer, buffer));
                }
            }
        }
        taken
    }

    /// Drop every request, closing all handles
    pub fn clear(&mut self) {
        let handles: usize = self.requests.values().map(|r| r.params.planes.len()).sum();
        self.requests.clear();
        debug!("Import bridge cleared, closed {} handles", handles);
    }
}
