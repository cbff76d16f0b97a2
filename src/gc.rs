//! The two-stage garbage collector: mark-sweep of the pair pool, then
//! compaction of the atom/string heap, per spec §4.3/§4.4.
//!
//! Two mark implementations are provided, as required by spec §4.4 and
//! tested for equivalence in §8.1 invariant 6: `mark_recursive`, which walks
//! the native call stack, and `mark_pointer_reversal`, a Schorr-Waite-style
//! traversal that reverses car/cdr links as it descends and restores them as
//! it ascends, using cell parity (even car-cell index vs. odd cdr-cell
//! index) to tell which phase a partially-visited node is in — no auxiliary
//! stack, O(1) native recursion depth.

use crate::memory::Memory;
use crate::value::{Tag, Value};

/// Root set: the global environment plus every live stack cell (spec §4.4).
pub fn collect(mem: &mut Memory, global_env: Value) {
    let slots = mem.pool_cells() / 2;
    let mut marked = vec![false; slots];
    mark_pointer_reversal_from_roots(mem, &mut marked, global_env);
    sweep(mem, &marked);
    compact(mem, &marked);
}

fn is_traceable(mem: &Memory, v: Value) -> Option<usize> {
    if !v.is_boxed() {
        return None;
    }
    match v.tag() {
        Tag::Cons | Tag::Closure | Tag::Macro => {
            let idx = v.ordinal() as usize;
            if mem.is_valid_pair_index(idx) {
                Some(idx)
            } else {
                None
            }
        }
        _ => None,
    }
}

// ---- stage 1a: recursive mark ----

pub fn mark_recursive(mem: &Memory, marked: &mut [bool], v: Value) {
    let Some(idx) = is_traceable(mem, v) else { return };
    let slot = idx / 2;
    if marked[slot] {
        return;
    }
    marked[slot] = true;
    mark_recursive(mem, marked, mem.car(idx));
    mark_recursive(mem, marked, mem.cdr(idx));
}

pub fn mark_recursive_from_roots(mem: &Memory, marked: &mut [bool], global_env: Value) {
    mark_recursive(mem, marked, global_env);
    for i in mem.stack_indices() {
        let v = mem.read_cell(i);
        mark_recursive(mem, marked, v);
    }
}

// ---- stage 1b: non-recursive pointer-reversal mark ----

/// Mark everything reachable from `root` without recursion. `prev` is a
/// *cell* index (not a pair index): an even value means "we are threading
/// back through a car cell and still owe this node its cdr"; an odd value
/// means "we are threading back through a cdr cell and this node is fully
/// done". 0 is impossible as a live cell index (pool slot 0 is reserved) and
/// doubles as the "no parent" sentinel.
pub fn mark_pointer_reversal(mem: &mut Memory, marked: &mut [bool], root: Value) {
    let mut t = root;
    let mut prev: usize = 0;

    loop {
        if let Some(idx) = is_traceable(mem, t) {
            let slot = idx / 2;
            if !marked[slot] {
                marked[slot] = true;
                let car_val = mem.car(idx);
                // Stash the grandparent link in car(idx), keeping t's own
                // tag so we can reconstruct a pointer to this node later.
                mem.write_cell(idx, Value::tagged(t.tag(), prev as u64));
                prev = idx; // even: "in car phase" for node idx
                t = car_val;
                continue;
            }
        }

        // Retreat: t is a leaf, an already-marked node, or a non-pointer.
        loop {
            if prev == 0 {
                return;
            }
            if prev % 2 == 0 {
                let idx = prev;
                let stashed = mem.read_cell(idx);
                let tag = stashed.tag();
                let grandparent = stashed.ordinal() as usize;
                let cdr_val = mem.cdr(idx);
                mem.write_cell(idx, t); // restore car(idx)
                mem.write_cell(idx + 1, Value::tagged(tag, grandparent as u64));
                prev = idx + 1; // odd: "in cdr phase" for node idx
                t = cdr_val;
                break; // back to the advance phase with the new t
            } else {
                let idx = prev - 1;
                let stashed = mem.read_cell(idx + 1);
                let tag = stashed.tag();
                let grandparent = stashed.ordinal() as usize;
                mem.write_cell(idx + 1, t); // restore cdr(idx)
                t = Value::tagged(tag, idx as u64); // node idx is now fully restored
                prev = grandparent;
                // keep retreating
            }
        }
    }
}

pub fn mark_pointer_reversal_from_roots(mem: &mut Memory, marked: &mut [bool], global_env: Value) {
    mark_pointer_reversal(mem, marked, global_env);
    let stack_range = mem.stack_indices();
    for i in stack_range {
        let v = mem.read_cell(i);
        mark_pointer_reversal(mem, marked, v);
    }
}

// ---- stage 1c: sweep ----

pub fn sweep(mem: &mut Memory, marked: &[bool]) {
    mem.clear_free_list();
    for idx in (2..mem.pool_cells()).step_by(2).rev() {
        if !marked[idx / 2] {
            mem.push_free(idx);
        }
    }
}

// ---- stage 2: heap compaction ----

pub fn compact(mem: &mut Memory, marked: &[bool]) {
    clear(mem);
    link(mem, marked);
    sweep_and_move(mem);
}

fn clear(mem: &mut Memory) {
    let sentinel = mem.total_cells() as u64;
    for off in mem.heap_entries() {
        mem.set_heap_backref(off, sentinel);
    }
}

fn link(mem: &mut Memory, marked: &[bool]) {
    for idx in (2..mem.pool_cells()).step_by(2) {
        if marked[idx / 2] {
            link_cell(mem, idx);
            link_cell(mem, idx + 1);
        }
    }
    for i in mem.stack_indices() {
        link_cell(mem, i);
    }
}

fn link_cell(mem: &mut Memory, cell_idx: usize) {
    let v = mem.read_cell(cell_idx);
    if v.is_boxed() && (v.is_atom() || v.is_string()) {
        let entry_off = v.ordinal() as usize;
        let old_head = mem.heap_backref(entry_off);
        mem.write_cell(cell_idx, Value::tagged(v.tag(), old_head));
        mem.set_heap_backref(entry_off, cell_idx as u64);
    }
}

fn sweep_and_move(mem: &mut Memory) {
    let sentinel = mem.total_cells() as u64;
    let heap_start = mem.pool_cells() * 8;
    let old_hp = mem.hp();
    let mut read_off = heap_start;
    let mut write_off = heap_start;

    while read_off < old_hp {
        let len = mem.entry_total_len(read_off);
        let backref = mem.heap_backref(read_off);
        if backref != sentinel {
            let mut node = backref as usize;
            loop {
                let v = mem.read_cell(node);
                let next = v.ordinal();
                mem.write_cell(node, Value::tagged(v.tag(), write_off as u64));
                if next == sentinel {
                    break;
                }
                node = next as usize;
            }
            if write_off != read_off {
                mem.move_entry(read_off, write_off, len);
            }
            write_off += len;
        }
        read_off += len;
    }
    mem.set_hp(write_off);
}
