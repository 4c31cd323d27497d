/// Vulkan debug messenger - validation layer messages with colored output
///
/// Active only when BackendSettings::enable_validation is set; the callback
/// prints straight to the console so validation output stays readable even
/// when a custom framework logger is installed.

use ash::vk;
use colored::*;
use std::ffi::{CStr, CString};

/// Messenger configuration used when validation is enabled
pub(crate) fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}

/// Callback invoked by the validation layers
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let severity_str = if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        "VULKAN ERROR".red().bold()
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        "VULKAN WARN ".yellow()
    } else {
        "VULKAN INFO ".cyan()
    };

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "perf"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else {
        "general"
    };

    println!(
        "[{}] [{}] {}: {}",
        severity_str,
        type_str,
        message_id_name.bright_blue(),
        message
    );

    // Vulkan requires debug callbacks to return VK_FALSE
    vk::FALSE
}

/// Attach a debug name to a Vulkan object so validation messages and captures
/// refer to it by something readable. No-op when validation is off (the
/// loader is None in that case).
pub(crate) fn set_object_name<H: vk::Handle>(
    debug_utils: Option<&ash::ext::debug_utils::Device>,
    handle: H,
    name: &str,
) {
    let Some(debug_utils) = debug_utils else {
        return;
    };
    let Ok(name) = CString::new(name) else {
        return;
    };

    let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
        .object_handle(handle)
        .object_name(&name);

    unsafe {
        debug_utils.set_debug_utils_object_name(&name_info).ok();
    }
}
