//! Opaque resource handles and the generational arena that backs them.
//!
//! A handle is `{backend, index, generation}`. The backend id comes from a
//! process-wide counter, so a handle can never be resolved by a renderer that
//! did not issue it.

use std::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU32, Ordering},
};

use corelib::{EngineError, EngineResult};

static NEXT_BACKEND_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate a fresh backend instance id.
pub fn next_backend_id() -> u32 {
    NEXT_BACKEND_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle {
    pub backend: u32,
    pub index: u32,
    pub generation: u32,
}

pub trait ArenaHandle: Copy + fmt::Display {
    const KIND: &'static str;
    fn from_raw(raw: RawHandle) -> Self;
    fn raw(self) -> RawHandle;
}

macro_rules! define_handle {
    ($name:ident, $kind:literal) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(RawHandle);

        impl $name {
            #[inline]
            pub fn backend(self) -> u32 {
                self.0.backend
            }

            #[inline]
            pub fn index(self) -> u32 {
                self.0.index
            }

            #[inline]
            pub fn generation(self) -> u32 {
                self.0.generation
            }
        }

        impl ArenaHandle for $name {
            const KIND: &'static str = $kind;

            fn from_raw(raw: RawHandle) -> Self {
                Self(raw)
            }

            fn raw(self) -> RawHandle {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{}(b{}:{}v{})",
                    Self::KIND,
                    self.0.backend,
                    self.0.index,
                    self.0.generation
                )
            }
        }
    };
}

define_handle!(TextureHandle, "Texture");
define_handle!(MeshHandle, "Mesh");

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

impl<T> Slot<T> {
    fn generation(&self) -> u32 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation } => *generation,
        }
    }
}

/// Slot storage owned by one backend instance. Released slots are reused with a
/// bumped generation, so stale handles are detected instead of aliasing.
pub struct ResourceArena<H, T> {
    backend: u32,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    _handle: PhantomData<H>,
}

impl<H: ArenaHandle, T> ResourceArena<H, T> {
    pub fn new(backend: u32) -> Self {
        Self {
            backend,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _handle: PhantomData,
        }
    }

    #[inline]
    pub fn backend(&self) -> u32 {
        self.backend
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, value: T) -> H {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = slot.generation().wrapping_add(1);
            *slot = Slot::Occupied { generation, value };
            return H::from_raw(RawHandle {
                backend: self.backend,
                index,
                generation,
            });
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        H::from_raw(RawHandle {
            backend: self.backend,
            index,
            generation: 0,
        })
    }

    /// Look up a live resource.
    pub fn get(&self, handle: H) -> EngineResult<&T> {
        let raw = self.check_owner(handle)?;
        match &self.slots[raw.index as usize] {
            Slot::Occupied { generation, value } if *generation == raw.generation => Ok(value),
            _ => Err(EngineError::InvalidHandle {
                handle: handle.to_string(),
                reason: "resource was released".into(),
            }),
        }
    }

    pub fn get_mut(&mut self, handle: H) -> EngineResult<&mut T> {
        let raw = self.check_owner(handle)?;
        match &mut self.slots[raw.index as usize] {
            Slot::Occupied { generation, value } if *generation == raw.generation => Ok(value),
            _ => Err(EngineError::InvalidHandle {
                handle: handle.to_string(),
                reason: "resource was released".into(),
            }),
        }
    }

    /// Take the resource out of its slot. Releasing twice reports [`EngineError::DoubleFree`].
    pub fn remove(&mut self, handle: H) -> EngineResult<T> {
        let raw = self.check_owner(handle)?;
        let slot = &mut self.slots[raw.index as usize];
        let live = matches!(slot, Slot::Occupied { generation, .. } if *generation == raw.generation);
        if live {
            let vacant = Slot::Vacant {
                generation: raw.generation,
            };
            if let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) {
                self.free.push(raw.index);
                self.live -= 1;
                return Ok(value);
            }
        }
        Err(EngineError::DoubleFree {
            handle: handle.to_string(),
        })
    }

    /// Release every live resource, leaving the slots vacant.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.live);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { generation, .. } = slot {
                let vacant = Slot::Vacant {
                    generation: *generation,
                };
                if let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) {
                    out.push(value);
                    self.free.push(index as u32);
                }
            }
        }
        self.live = 0;
        out
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        })
    }

    fn check_owner(&self, handle: H) -> EngineResult<RawHandle> {
        let raw = handle.raw();
        if raw.backend != self.backend {
            return Err(EngineError::InvalidHandle {
                handle: handle.to_string(),
                reason: format!("issued by backend {}, not {}", raw.backend, self.backend),
            });
        }
        match self.slots.get(raw.index as usize) {
            Some(slot) if raw.generation <= slot.generation() => Ok(raw),
            _ => Err(EngineError::InvalidHandle {
                handle: handle.to_string(),
                reason: "never issued".into(),
            }),
        }
    }
}
