pub mod request;

pub use request::{
    Approver, DateSpan, LeaveHours, LeaveHoursError, LeaveRequest, RequestId, Requester, UserId,
    MAX_HOURS_PER_DAY, MAX_HOURS_SCALE, MAX_SPAN_DAYS,
};
