//! Key schema shared by producers and consumers.

/// Presence snapshot (raw JPEG) of the frame where a vehicle entered a region.
pub const VEHICLE_IN: &str = "vehicle_in";

/// Barrier position, `"up"` or `"down"`.
pub const BARRIER_STATUS: &str = "barrier_status";

pub const FLAG_ON: &[u8] = b"1";
pub const FLAG_OFF: &[u8] = b"0";

pub fn stream_frame(camera_id: &str) -> String {
    format!("{camera_id}_stream_frame")
}

pub fn stream_flag(camera_id: &str) -> String {
    format!("{camera_id}_stream_flag")
}

pub fn processed_frame(camera_id: &str) -> String {
    format!("{camera_id}_processed_frame")
}

pub fn processed_flag(camera_id: &str) -> String {
    format!("{camera_id}_processed_flag")
}

pub fn vehicle_crop(camera_id: &str, track_id: u32) -> String {
    format!("{camera_id}_vehicle_{track_id}")
}
