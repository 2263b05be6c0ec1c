pub mod m202607150001_create_students;
pub mod m202607150002_create_qr_tokens;
pub mod m202607150003_create_attendance;
