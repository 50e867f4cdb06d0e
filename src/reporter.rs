use crate::{l18n, platform::Reporter};

/// Modal message boxes on Windows, where the process usually has no console.
/// Other platforms render the same messages on stderr.
pub struct Dialogs;

#[cfg(windows)]
mod message_box {
    use crate::utils::to_wide;
    use std::ffi::OsStr;
    use windows_sys::Win32::UI::WindowsAndMessaging::{MessageBoxW, MESSAGEBOX_STYLE};

    pub fn show(text: &str, caption: &str, style: MESSAGEBOX_STYLE) {
        let text = to_wide(OsStr::new(text));
        let caption = to_wide(OsStr::new(caption));
        unsafe {
            MessageBoxW(std::ptr::null_mut(), text.as_ptr(), caption.as_ptr(), style);
        }
    }
}

#[cfg(windows)]
impl Reporter for Dialogs {
    fn fatal(&self, message: &str) {
        use windows_sys::Win32::UI::WindowsAndMessaging::MB_ICONERROR;
        message_box::show(message, &l18n::tr("Error"), MB_ICONERROR);
    }

    fn info(&self, title: &str, message: &str) {
        use windows_sys::Win32::UI::WindowsAndMessaging::MB_ICONINFORMATION;
        message_box::show(message, title, MB_ICONINFORMATION);
    }
}

#[cfg(not(windows))]
impl Reporter for Dialogs {
    fn fatal(&self, message: &str) {
        use colored::Colorize;
        eprintln!("{} {}", format!("{}:", l18n::tr("Error")).red().bold(), message);
    }

    fn info(&self, title: &str, message: &str) {
        use colored::Colorize;
        eprintln!("{}\n{}", title.bold(), message);
    }
}
