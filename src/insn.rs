//! Memory-format instruction descriptors and the in-flight window.
//!
//! The Mbox never owns instructions. The Ibox keeps every in-flight
//! instruction in a bounded window and hands the Mbox generation-counted
//! handles, so a squashed and reallocated slot can never be confused with
//! the instruction that used to live there. This module provides:
//! 1. **Opcodes:** The memory-format subset with access width, extension, and alignment rules.
//! 2. **Descriptors:** The instruction record the Ebox publishes and the Mbox completes.
//! 3. **Window:** The arena of in-flight instructions with handle validation.

use parking_lot::Mutex;

/// Memory-format opcodes that reach the Mbox.
///
/// Loads with an R31 destination never appear here; the issue logic turns
/// them into prefetch hints before they are published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// Load zero-extended byte.
    Ldbu,
    /// Load zero-extended word.
    Ldwu,
    /// Load F-format (VAX single).
    Ldf,
    /// Load S-format (IEEE single).
    Lds,
    /// Load sign-extended longword.
    Ldl,
    /// Load longword locked.
    LdlL,
    /// Load G-format (VAX double).
    Ldg,
    /// Load T-format (IEEE double).
    Ldt,
    /// Load quadword.
    Ldq,
    /// Load quadword locked.
    LdqL,
    /// Load unaligned quadword. The Ebox masks the low address bits.
    LdqU,
    /// PALmode load. The longword flag selects a 4-byte access.
    HwLd {
        /// Longword (4-byte) rather than quadword access.
        longword: bool,
    },
    /// Store byte.
    Stb,
    /// Store word.
    Stw,
    /// Store F-format.
    Stf,
    /// Store S-format.
    Sts,
    /// Store longword.
    Stl,
    /// Store longword conditional.
    StlC,
    /// Store G-format.
    Stg,
    /// Store T-format.
    Stt,
    /// Store quadword.
    Stq,
    /// Store quadword conditional.
    StqC,
    /// Store unaligned quadword. The Ebox masks the low address bits.
    StqU,
}

/// How a load result is widened to 64 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extension {
    /// Zero-extend the access width.
    Zero,
    /// Sign-extend the access width.
    Sign,
}

impl Opcode {
    /// Access width in bytes.
    pub fn width(&self) -> usize {
        match self {
            Opcode::Ldbu | Opcode::Stb => 1,
            Opcode::Ldwu | Opcode::Stw => 2,
            Opcode::Ldf
            | Opcode::Lds
            | Opcode::Ldl
            | Opcode::LdlL
            | Opcode::Stf
            | Opcode::Sts
            | Opcode::Stl
            | Opcode::StlC => 4,
            Opcode::HwLd { longword } => {
                if *longword {
                    4
                } else {
                    8
                }
            }
            Opcode::Ldg
            | Opcode::Ldt
            | Opcode::Ldq
            | Opcode::LdqL
            | Opcode::LdqU
            | Opcode::Stg
            | Opcode::Stt
            | Opcode::Stq
            | Opcode::StqC
            | Opcode::StqU => 8,
        }
    }

    /// Returns true for load-format opcodes.
    pub fn is_load(&self) -> bool {
        matches!(
            self,
            Opcode::Ldbu
                | Opcode::Ldwu
                | Opcode::Ldf
                | Opcode::Lds
                | Opcode::Ldl
                | Opcode::LdlL
                | Opcode::Ldg
                | Opcode::Ldt
                | Opcode::Ldq
                | Opcode::LdqL
                | Opcode::LdqU
                | Opcode::HwLd { .. }
        )
    }

    /// Returns true for store-format opcodes.
    pub fn is_store(&self) -> bool {
        !self.is_load()
    }

    /// How the loaded value is widened into the destination.
    ///
    /// Longword loads sign-extend; byte and word loads zero-extend. For
    /// quadword accesses the distinction is immaterial.
    pub fn extension(&self) -> Extension {
        match self {
            Opcode::Ldl | Opcode::LdlL | Opcode::HwLd { longword: true } => Extension::Sign,
            _ => Extension::Zero,
        }
    }

    /// Whether the virtual address must be naturally aligned.
    ///
    /// The unaligned quadword forms are exempt because the Ebox already
    /// cleared the low address bits.
    pub fn requires_alignment(&self) -> bool {
        !matches!(self, Opcode::LdqU | Opcode::StqU)
    }

    /// Architectural opcode number, as recorded in `MM_STAT` on a fault.
    pub fn number(&self) -> u8 {
        match self {
            Opcode::Ldbu => 0x0A,
            Opcode::LdqU => 0x0B,
            Opcode::Ldwu => 0x0C,
            Opcode::Stw => 0x0D,
            Opcode::Stb => 0x0E,
            Opcode::StqU => 0x0F,
            Opcode::HwLd { .. } => 0x1B,
            Opcode::Ldf => 0x20,
            Opcode::Ldg => 0x21,
            Opcode::Lds => 0x22,
            Opcode::Ldt => 0x23,
            Opcode::Stf => 0x24,
            Opcode::Stg => 0x25,
            Opcode::Sts => 0x26,
            Opcode::Stt => 0x27,
            Opcode::Ldl => 0x28,
            Opcode::Ldq => 0x29,
            Opcode::LdlL => 0x2A,
            Opcode::LdqL => 0x2B,
            Opcode::Stl => 0x2C,
            Opcode::Stq => 0x2D,
            Opcode::StlC => 0x2E,
            Opcode::StqC => 0x2F,
        }
    }

    /// Load-locked forms.
    pub fn is_load_locked(&self) -> bool {
        matches!(self, Opcode::LdlL | Opcode::LdqL)
    }

    /// Store-conditional forms.
    pub fn is_store_conditional(&self) -> bool {
        matches!(self, Opcode::StlC | Opcode::StqC)
    }
}

/// Lifecycle state of an in-flight instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InstrState {
    /// Sitting in an issue queue.
    #[default]
    Queued,
    /// Picked by a functional unit; the Ebox is about to publish it.
    Executing,
    /// Published to the Mbox; result not yet materialized.
    WaitingForCompletion,
    /// Result materialized; the Ibox may retire it.
    WaitingRetirement,
    /// Retired in program order.
    Retired,
    /// Squashed by a misprediction or fault.
    Aborted,
}

/// A single in-flight memory instruction.
///
/// `unique_id` is assigned monotonically at issue and is the sole basis of
/// age comparison everywhere in the pipeline.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// Memory-format opcode.
    pub opcode: Opcode,
    /// Program counter of the instruction.
    pub pc: u64,
    /// Monotonic program-order tag.
    pub unique_id: u64,
    /// Architectural destination register.
    pub a_dest: u8,
    /// First source operand value (base register).
    pub src1v: u64,
    /// Second source operand value (store data).
    pub src2v: u64,
    /// Sign-extended 16-bit displacement.
    pub displacement: i64,
    /// Destination value slot, written by the Mbox at completion.
    pub destv: u64,
    /// Lifecycle state.
    pub state: InstrState,
    /// Load-locked wants the lock flag established at retirement.
    pub lock_flag_pending: bool,
    /// Physical address the pending lock covers.
    pub lock_phys_addr_pending: u64,
    /// Virtual address the pending lock covers.
    pub lock_virt_addr_pending: u64,
    /// Store-conditional clears the lock flag at retirement.
    pub clear_lock_pending: bool,
}

impl Instruction {
    /// Creates a descriptor in the `Executing` state, the state the Ebox
    /// sets immediately before publishing to the Mbox.
    pub fn new(opcode: Opcode, pc: u64, unique_id: u64) -> Self {
        Self {
            opcode,
            pc,
            unique_id,
            a_dest: 0,
            src1v: 0,
            src2v: 0,
            displacement: 0,
            destv: 0,
            state: InstrState::Executing,
            lock_flag_pending: false,
            lock_phys_addr_pending: 0,
            lock_virt_addr_pending: 0,
            clear_lock_pending: false,
        }
    }

    /// Sets the destination register.
    pub fn with_dest(mut self, a_dest: u8) -> Self {
        self.a_dest = a_dest;
        self
    }
}

/// Validated reference to an instruction in the in-flight window.
///
/// A handle is only as alive as its generation; once the Ibox reclaims the
/// slot, every outstanding handle to it goes stale and dereferences to
/// `None` instead of to an unrelated instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstrHandle {
    index: u32,
    generation: u32,
}

struct WindowSlot {
    generation: u32,
    instr: Option<Instruction>,
}

/// Bounded arena of in-flight instructions, owned by the Ibox.
///
/// The Mbox addresses instructions exclusively through [`InstrHandle`]s.
pub struct InflightWindow {
    slots: Mutex<Vec<WindowSlot>>,
}

impl InflightWindow {
    /// Creates a window with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(WindowSlot {
                generation: 0,
                instr: None,
            });
        }
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Inserts an instruction, returning its handle, or `None` if the
    /// window is full.
    pub fn insert(&self, instr: Instruction) -> Option<InstrHandle> {
        let mut slots = self.slots.lock();
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.instr.is_none() {
                slot.generation = slot.generation.wrapping_add(1);
                slot.instr = Some(instr);
                return Some(InstrHandle {
                    index: index as u32,
                    generation: slot.generation,
                });
            }
        }
        None
    }

    /// Runs `f` against the instruction behind `handle`, if it is still
    /// alive.
    pub fn with<R>(&self, handle: InstrHandle, f: impl FnOnce(&Instruction) -> R) -> Option<R> {
        let slots = self.slots.lock();
        let slot = slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.instr.as_ref().map(f)
    }

    /// Runs `f` against the instruction behind `handle` mutably, if it is
    /// still alive.
    pub fn with_mut<R>(
        &self,
        handle: InstrHandle,
        f: impl FnOnce(&mut Instruction) -> R,
    ) -> Option<R> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.instr.as_mut().map(f)
    }

    /// Reclaims the slot behind `handle`, invalidating every copy of the
    /// handle. Returns the instruction that occupied it.
    pub fn remove(&self, handle: InstrHandle) -> Option<Instruction> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.instr.take()
    }
}
