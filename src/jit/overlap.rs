//! Aliasing checks for vector destinations.
//!
//! VFPU register groups can overlap in arbitrary swizzled ways, so before a
//! handler writes lane `di` of the destination straight into its host binding
//! it must know that no lane it has yet to read is the same register. Lanes
//! are emitted in order and lane `i` of the sources is consumed by the
//! instruction that writes lane `i`, which is why `sregs[di]` itself may
//! alias under [`is_overlap_safe_allow_s`].

/// `dreg` appears in neither `tregs` nor any slot of `sregs` except `di`.
pub fn is_overlap_safe_allow_s(dreg: u8, di: usize, sregs: &[u8], tregs: &[u8]) -> bool {
    let in_sources = sregs
        .iter()
        .enumerate()
        .any(|(i, &sreg)| sreg == dreg && i != di);
    !in_sources && !tregs.contains(&dreg)
}

/// Like [`is_overlap_safe_allow_s`], and `sregs[di]` must not be `dreg` either.
pub fn is_overlap_safe(dreg: u8, di: usize, sregs: &[u8], tregs: &[u8]) -> bool {
    is_overlap_safe_allow_s(dreg, di, sregs, tregs) && sregs.get(di) != Some(&dreg)
}
