//! Typed, non-aliasing views over a caller-owned scratch buffer.
//!
//! One gemm call needs three regions: the packed LHS row panel (rewritten for
//! every row iteration), all packed RHS panels (written once), and the `i32`
//! accumulator tile. [`ScratchArena::partition`] validates the buffer once and
//! carves the regions with `split_at_mut`, so the stages below never compute
//! raw offsets themselves.

use log::debug;

use crate::error::{layout_error, scratch_error, Result};
use crate::tile::ScratchLayout;
use crate::ARENA_ALIGNMENT;

/// The three scratch regions of one gemm call.
#[derive(Debug)]
pub struct ScratchArena<'a> {
    pub lhs_panel: &'a mut [u8],
    pub rhs_panels: &'a mut [u8],
    pub accumulator: &'a mut [i32],
    pub layout: ScratchLayout,
}

impl<'a> ScratchArena<'a> {
    /// Partitions `scratch` according to `layout`.
    ///
    /// The base is first advanced to the next [`ARENA_ALIGNMENT`] boundary, which
    /// is why [`ScratchLayout::total_bytes`] includes that much slack.
    ///
    /// # Errors
    ///
    /// Fails when `scratch` is shorter than `layout.total_bytes()`.
    pub fn partition(scratch: &'a mut [u8], layout: &ScratchLayout) -> Result<Self> {
        let required = layout.total_bytes();
        if scratch.len() < required {
            return Err(scratch_error(required, scratch.len()));
        }

        let skip = scratch.as_ptr().align_offset(ARENA_ALIGNMENT);
        if skip >= ARENA_ALIGNMENT {
            return Err(layout_error(
                scratch.len(),
                ARENA_ALIGNMENT,
                "scratch base cannot be aligned",
            ));
        }

        let (_, aligned) = scratch.split_at_mut(skip);
        let (lhs_offset, rhs_offset, accumulator_offset) = layout.region_offsets();
        let (lhs_region, rest) = aligned.split_at_mut(rhs_offset - lhs_offset);
        let (rhs_region, rest) = rest.split_at_mut(accumulator_offset - rhs_offset);
        let accumulator_region = &mut rest[..layout.accumulator_bytes()];

        // SAFETY: every bit pattern is a valid i32; the prefix/suffix split
        // keeps the view inside `accumulator_region`.
        let (prefix, accumulator, _) = unsafe { accumulator_region.align_to_mut::<i32>() };
        if !prefix.is_empty() || accumulator.len() < layout.accumulator_len {
            return Err(layout_error(
                layout.accumulator_bytes(),
                std::mem::align_of::<i32>(),
                "accumulator region is not i32 aligned",
            ));
        }

        debug!(
            "scratch arena: skip={} lhs={}B rhs={}B acc={}x i32 (stride {})",
            skip,
            layout.lhs_panel_bytes,
            layout.rhs_panels_bytes,
            layout.accumulator_len,
            layout.accumulator_stride
        );

        Ok(Self {
            lhs_panel: &mut lhs_region[..layout.lhs_panel_bytes],
            rhs_panels: &mut rhs_region[..layout.rhs_panels_bytes],
            accumulator: &mut accumulator[..layout.accumulator_len],
            layout: *layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::GemmShape;
    use crate::utils::AlignedBuffer;
    use crate::QgemmError;

    #[test]
    fn test_partition_sizes() {
        let layout = ScratchLayout::new(GemmShape::new(5, 7, 19));
        let mut scratch = vec![0u8; layout.total_bytes()];
        let arena = ScratchArena::partition(&mut scratch, &layout).unwrap();

        assert_eq!(arena.lhs_panel.len(), layout.lhs_panel_bytes);
        assert_eq!(arena.rhs_panels.len(), layout.rhs_panels_bytes);
        assert_eq!(arena.accumulator.len(), layout.accumulator_len);
        assert_eq!(arena.lhs_panel.as_ptr() as usize % ARENA_ALIGNMENT, 0);
        assert_eq!(arena.rhs_panels.as_ptr() as usize % ARENA_ALIGNMENT, 0);
    }

    #[test]
    fn test_partition_misaligned_base() {
        let layout = ScratchLayout::new(GemmShape::new(3, 3, 8));
        let mut buffer = AlignedBuffer::zeroed(layout.total_bytes() + 1, 64).unwrap();
        let arena = ScratchArena::partition(&mut buffer[1..], &layout).unwrap();
        assert_eq!(arena.lhs_panel.as_ptr() as usize % ARENA_ALIGNMENT, 0);
    }

    #[test]
    fn test_partition_rejects_short_scratch() {
        let layout = ScratchLayout::new(GemmShape::new(4, 4, 4));
        let mut scratch = vec![0u8; layout.total_bytes() - 1];
        let err = ScratchArena::partition(&mut scratch, &layout).unwrap_err();
        assert_eq!(
            err,
            QgemmError::ScratchTooSmall {
                required: layout.total_bytes(),
                provided: layout.total_bytes() - 1,
            }
        );
    }

    #[test]
    fn test_regions_are_disjoint() {
        let layout = ScratchLayout::new(GemmShape::new(6, 9, 33));
        let mut scratch = vec![0u8; layout.total_bytes()];
        let arena = ScratchArena::partition(&mut scratch, &layout).unwrap();

        let lhs_end = arena.lhs_panel.as_ptr() as usize + arena.lhs_panel.len();
        let rhs_start = arena.rhs_panels.as_ptr() as usize;
        let rhs_end = rhs_start + arena.rhs_panels.len();
        let acc_start = arena.accumulator.as_ptr() as usize;
        assert!(lhs_end <= rhs_start);
        assert!(rhs_end <= acc_start);
    }
}
