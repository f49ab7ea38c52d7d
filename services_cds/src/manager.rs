//! CDS manager: boot-time recovery and the named registry
//!
//! Boot follows a rebuild-else-reinitialize ladder. If both sentinels
//! match, the previous registry image and block pool are rebuilt so
//! applications re-registering after a processor reset get their data
//! back. If the region fails validation, or the rebuild finds it
//! self-inconsistent, the region is wiped and re-initialized; that is
//! still a successful boot, just with no prior data. Only an
//! unrecoverable media error fails early init outright.

use crate::layout::{RegionLayout, BEGIN_SENTINEL, END_SENTINEL};
use crate::pool::{CdsHandle, CdsPool};
use crate::registry::{validate_name, RegisterOutcome, RegistryEntry, RegistryImage};
use exec_types::{config, EsError};
use psp_api::{PspApi, PspError};

/// Whether the persistent region is usable on this platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdsAvailability {
    Available,
    /// The region is absent or below the configured minimum; all CDS
    /// operations report `CdsNotAvailable`
    NotAvailable,
}

fn media_err(err: PspError) -> EsError {
    EsError::CdsAccessError(err.to_string())
}

struct CdsState {
    layout: RegionLayout,
    pool: CdsPool,
    entries: Vec<Option<RegistryEntry>>,
}

/// The critical data store service
///
/// Owns the registry and block pool; the platform region itself is
/// borrowed per call so tests can drive it with `RamCds`/`FaultyCds`.
pub struct CdsManager {
    state: Option<CdsState>,
}

impl CdsManager {
    /// Starts the service with no usable region; `early_init` upgrades
    /// it when the platform provides one
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Boot-time recovery of the persistent region
    ///
    /// Returns `NotAvailable` (still `Ok`) when the platform region is
    /// smaller than `CDS_MIN_REGION_SIZE`. A region failing validation
    /// or rebuild is re-initialized empty rather than failing the boot.
    pub fn early_init<P: PspApi>(&mut self, psp: &mut P) -> Result<CdsAvailability, EsError> {
        let size = psp.cds_size().map_err(media_err)?;
        if size < config::CDS_MIN_REGION_SIZE {
            self.state = None;
            return Ok(CdsAvailability::NotAvailable);
        }
        let layout = RegionLayout::for_size(size);

        match self.validate_region(psp, &layout) {
            Ok(()) => match self.rebuild(psp, layout) {
                Ok(state) => {
                    self.state = Some(state);
                }
                Err(EsError::CdsAccessError(msg)) => {
                    return Err(EsError::CdsAccessError(msg));
                }
                // Sentinels intact but contents inconsistent: start over
                Err(_) => {
                    self.state = Some(self.initialize_region(psp, layout)?);
                }
            },
            Err(EsError::CdsInvalid) => {
                self.state = Some(self.initialize_region(psp, layout)?);
            }
            Err(err) => return Err(err),
        }
        Ok(CdsAvailability::Available)
    }

    /// Checks the begin/end sentinel markers
    fn validate_region<P: PspApi>(
        &self,
        psp: &mut P,
        layout: &RegionLayout,
    ) -> Result<(), EsError> {
        let mut marker = [0u8; 8];
        psp.cds_read(0, &mut marker).map_err(media_err)?;
        if &marker != BEGIN_SENTINEL {
            return Err(EsError::CdsInvalid);
        }
        psp.cds_read(layout.end_sentinel_offset(), &mut marker)
            .map_err(media_err)?;
        if &marker != END_SENTINEL {
            return Err(EsError::CdsInvalid);
        }
        Ok(())
    }

    /// Wipes the region: empty registry image, fresh pool, sentinels
    ///
    /// The end sentinel is written last so a crash mid-initialization
    /// leaves a region that fails validation instead of one that
    /// rebuilds garbage.
    fn initialize_region<P: PspApi>(
        &self,
        psp: &mut P,
        layout: RegionLayout,
    ) -> Result<CdsState, EsError> {
        let pool = CdsPool::create(layout)?;
        // The rebuild walk stops at the first descriptor whose check
        // bits do not match, so the pool area must read as empty:
        // stale bytes from the previous incarnation could otherwise be
        // picked up as descriptors on the next boot.
        Self::wipe_pool_area(psp, &layout)?;
        let state = CdsState {
            layout,
            pool,
            entries: (0..config::CDS_MAX_ENTRIES).map(|_| None).collect(),
        };
        Self::write_registry_image(psp, &state)?;
        psp.cds_write(0, BEGIN_SENTINEL).map_err(media_err)?;
        psp.cds_write(layout.end_sentinel_offset(), END_SENTINEL)
            .map_err(media_err)?;
        Ok(state)
    }

    fn wipe_pool_area<P: PspApi>(psp: &mut P, layout: &RegionLayout) -> Result<(), EsError> {
        let zeros = [0u8; 1024];
        let mut offset = layout.pool_offset;
        while offset < layout.pool_end {
            let chunk = zeros.len().min(layout.pool_end - offset);
            psp.cds_write(offset, &zeros[..chunk]).map_err(media_err)?;
            offset += chunk;
        }
        Ok(())
    }

    /// Recovers the registry image and pool bookkeeping after a reset
    fn rebuild<P: PspApi>(&self, psp: &mut P, layout: RegionLayout) -> Result<CdsState, EsError> {
        let mut len_raw = [0u8; 4];
        psp.cds_read(layout.image_len_offset(), &mut len_raw)
            .map_err(media_err)?;
        let image_len = u32::from_le_bytes(len_raw) as usize;
        if image_len == 0 || image_len > layout.registry_capacity {
            return Err(EsError::CdsInvalid);
        }

        let mut raw = vec![0u8; image_len];
        psp.cds_read(layout.registry_offset, &mut raw)
            .map_err(media_err)?;
        let image: RegistryImage =
            serde_json::from_slice(&raw).map_err(|_| EsError::CdsInvalid)?;
        if image.entries.len() > config::CDS_MAX_ENTRIES {
            return Err(EsError::CdsInvalid);
        }

        let pool = CdsPool::rebuild(layout, psp)?;
        for entry in &image.entries {
            pool.validate(psp, entry.handle)?;
        }

        let mut entries: Vec<Option<RegistryEntry>> =
            (0..config::CDS_MAX_ENTRIES).map(|_| None).collect();
        for (slot, entry) in image.entries.into_iter().enumerate() {
            entries[slot] = Some(entry);
        }
        Ok(CdsState {
            layout,
            pool,
            entries,
        })
    }

    /// Persists the registry image; in-memory state must only change
    /// after this succeeds
    fn write_registry_image<P: PspApi>(psp: &mut P, state: &CdsState) -> Result<(), EsError> {
        let image = RegistryImage {
            entries: state.entries.iter().flatten().cloned().collect(),
        };
        let raw = serde_json::to_vec(&image)
            .map_err(|err| EsError::CdsAccessError(err.to_string()))?;
        if raw.len() > state.layout.registry_capacity {
            return Err(EsError::CdsRegistryFull);
        }
        psp.cds_write(state.layout.registry_offset, &raw)
            .map_err(media_err)?;
        psp.cds_write(
            state.layout.image_len_offset(),
            &(raw.len() as u32).to_le_bytes(),
        )
        .map_err(media_err)?;
        Ok(())
    }

    pub fn availability(&self) -> CdsAvailability {
        if self.state.is_some() {
            CdsAvailability::Available
        } else {
            CdsAvailability::NotAvailable
        }
    }

    fn state_mut(&mut self) -> Result<&mut CdsState, EsError> {
        self.state.as_mut().ok_or(EsError::CdsNotAvailable)
    }

    fn state(&self) -> Result<&CdsState, EsError> {
        self.state.as_ref().ok_or(EsError::CdsNotAvailable)
    }

    /// Registers a named block, reusing or resizing an existing one
    ///
    /// Names are dotted `Owner.Name` strings. Re-registering with the
    /// same size returns the existing handle and `AlreadyExists`; a
    /// different size reallocates and discards prior contents.
    pub fn register<P: PspApi>(
        &mut self,
        psp: &mut P,
        name: &str,
        size: usize,
        table: bool,
    ) -> Result<(RegisterOutcome, CdsHandle), EsError> {
        if !validate_name(name) {
            return Err(EsError::CdsInvalidName(name.to_string()));
        }
        if size == 0 || size > config::CDS_MAX_BLOCK_SIZE {
            return Err(EsError::CdsInvalidSize);
        }
        let state = self.state_mut()?;

        let existing = state
            .entries
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.name == name));

        if let Some(slot) = existing {
            let old = state.entries[slot].clone().ok_or(EsError::CdsInvalid)?;
            if old.size == size {
                return Ok((RegisterOutcome::AlreadyExists, old.handle));
            }

            // Resize: allocate the replacement first, commit the
            // registry, only then release the old block.
            let handle = state.pool.get_block(psp, size)?;
            state.entries[slot] = Some(RegistryEntry {
                name: name.to_string(),
                handle,
                size,
                table,
            });
            if let Err(err) = Self::write_registry_image(psp, state) {
                state.entries[slot] = Some(old);
                let _ = state.pool.put_block(psp, handle);
                return Err(err);
            }
            let _ = state.pool.put_block(psp, old.handle);
            return Ok((RegisterOutcome::Resized, handle));
        }

        let slot = state
            .entries
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(EsError::CdsRegistryFull)?;
        let handle = state.pool.get_block(psp, size)?;
        state.entries[slot] = Some(RegistryEntry {
            name: name.to_string(),
            handle,
            size,
            table,
        });
        if let Err(err) = Self::write_registry_image(psp, state) {
            state.entries[slot] = None;
            let _ = state.pool.put_block(psp, handle);
            return Err(err);
        }
        Ok((RegisterOutcome::Created, handle))
    }

    /// Deletes a named block
    ///
    /// `table` must match how the block was registered. The caller
    /// supplies `owner_active`, computed against the live application
    /// table; a forced delete passes `false`.
    pub fn delete<P: PspApi>(
        &mut self,
        psp: &mut P,
        name: &str,
        table: bool,
        owner_active: bool,
    ) -> Result<(), EsError> {
        let state = self.state_mut()?;
        let slot = state
            .entries
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.name == name))
            .ok_or_else(|| EsError::CdsNotFound(name.to_string()))?;
        let entry = state.entries[slot].clone().ok_or(EsError::CdsInvalid)?;

        if entry.table != table {
            return Err(EsError::BadArgument(format!(
                "CDS {name} registered as {}",
                if entry.table { "table" } else { "data" }
            )));
        }
        if owner_active {
            return Err(EsError::CdsOwnerActive);
        }

        state.entries[slot] = None;
        if let Err(err) = Self::write_registry_image(psp, state) {
            state.entries[slot] = Some(entry);
            return Err(err);
        }
        // Registry is durably updated; a put_block failure leaks the
        // block until the next rebuild but never resurrects the name.
        state.pool.put_block(psp, entry.handle)?;
        Ok(())
    }

    /// Writes a registered block's payload
    pub fn copy_to_cds<P: PspApi>(
        &mut self,
        psp: &mut P,
        handle: CdsHandle,
        data: &[u8],
    ) -> Result<(), EsError> {
        let state = self.state_mut()?;
        state.pool.block_write(psp, handle, data)
    }

    /// Reads a registered block's payload, verifying its CRC
    pub fn restore_from_cds<P: PspApi>(
        &mut self,
        psp: &mut P,
        handle: CdsHandle,
        buf: &mut [u8],
    ) -> Result<(), EsError> {
        let state = self.state_mut()?;
        state.pool.block_read(psp, handle, buf)
    }

    /// Resolves a dotted name to its handle
    pub fn lookup(&self, name: &str) -> Result<CdsHandle, EsError> {
        let state = self.state()?;
        state
            .entries
            .iter()
            .flatten()
            .find(|e| e.name == name)
            .map(|e| e.handle)
            .ok_or_else(|| EsError::CdsNotFound(name.to_string()))
    }

    /// Snapshot of all registered entries, for the registry dump job
    pub fn registry_snapshot(&self) -> Vec<RegistryEntry> {
        match &self.state {
            Some(state) => state.entries.iter().flatten().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        match &self.state {
            Some(state) => state.entries.iter().flatten().count(),
            None => 0,
        }
    }
}

impl Default for CdsManager {
    fn default() -> Self {
        Self::new()
    }
}
