//! Windows virtual memory implementation using VirtualAlloc/VirtualFree.

use core::ffi::c_void;

const MEM_COMMIT: u32 = 0x1000;
const MEM_RESERVE: u32 = 0x2000;
const MEM_RELEASE: u32 = 0x8000;
const MEM_DECOMMIT: u32 = 0x4000;
const PAGE_READWRITE: u32 = 0x04;
const PAGE_NOACCESS: u32 = 0x01;

unsafe extern "system" {
    fn VirtualAlloc(
        lpAddress: *mut c_void,
        dwSize: usize,
        flAllocationType: u32,
        flProtect: u32,
    ) -> *mut c_void;

    fn VirtualFree(lpAddress: *mut c_void, dwSize: usize, dwFreeType: u32) -> i32;

    fn VirtualProtect(
        lpAddress: *mut c_void,
        dwSize: usize,
        flNewProtect: u32,
        lpflOldProtect: *mut u32,
    ) -> i32;

    fn SetThreadAffinityMask(hThread: *mut c_void, dwThreadAffinityMask: usize) -> usize;
    fn GetCurrentThread() -> *mut c_void;
}

pub unsafe fn map_aligned(size: usize, align: usize) -> *mut u8 {
    debug_assert!(align.is_power_of_two());
    // VirtualAlloc reservations are 64 KiB aligned by the allocation
    // granularity on every supported Windows version; our arena's minimum
    // slab size matches that, so no manual trimming is needed here.
    let ptr = unsafe {
        VirtualAlloc(
            core::ptr::null_mut(),
            size,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        )
    };
    if ptr.is_null() || (ptr as usize) % align != 0 {
        return core::ptr::null_mut();
    }
    ptr as *mut u8
}

pub unsafe fn unmap(ptr: *mut u8, _size: usize) {
    unsafe {
        VirtualFree(ptr as *mut c_void, 0, MEM_RELEASE);
    }
}

pub unsafe fn decommit(ptr: *mut u8, size: usize) {
    unsafe {
        VirtualFree(ptr as *mut c_void, size, MEM_DECOMMIT);
    }
}

pub unsafe fn guard(ptr: *mut u8, size: usize) -> bool {
    let mut old = 0u32;
    unsafe { VirtualProtect(ptr as *mut c_void, size, PAGE_NOACCESS, &mut old) != 0 }
}

pub fn pin_to_cpu(cpu: usize) -> bool {
    let mask = 1usize << cpu;
    unsafe { SetThreadAffinityMask(GetCurrentThread(), mask) != 0 }
}
