//! Process elevation and console code-page queries.
//!
//! Thin platform shims: the real answers come from the Windows API, other
//! platforms get conservative fallbacks so the rest of the crate stays
//! portable and testable.

use crate::util::constants::FALLBACK_OEM_CODE_PAGE;

/// Whether the current process runs with administrator rights.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    // SAFETY: IsUserAnAdmin takes no arguments and has no preconditions.
    unsafe { windows::Win32::UI::Shell::IsUserAnAdmin().as_bool() }
}

/// Whether the current process runs with administrator rights.
///
/// Always `false` off Windows: none of the remediation tools exist there.
#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    false
}

/// The console OEM code page of this system (e.g. 850 on Spanish Windows).
#[cfg(windows)]
pub fn oem_code_page() -> u32 {
    // SAFETY: GetOEMCP takes no arguments and cannot fail.
    let cp = unsafe { windows::Win32::Globalization::GetOEMCP() };
    if cp == 0 {
        FALLBACK_OEM_CODE_PAGE
    } else {
        cp
    }
}

/// The console OEM code page of this system.
#[cfg(not(windows))]
pub fn oem_code_page() -> u32 {
    FALLBACK_OEM_CODE_PAGE
}
