pub mod attendance_record;
pub mod attendance_session;
pub mod qr_token;
pub mod student;

pub use attendance_record::Entity as AttendanceRecord;
pub use attendance_session::Entity as AttendanceSession;
pub use qr_token::Entity as QrToken;
pub use student::Entity as Student;
