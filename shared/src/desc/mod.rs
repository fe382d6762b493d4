mod cmd;
mod dat;
mod evt;

pub use cmd::CmdDesc;
pub use dat::DatDesc;
pub use evt::EvtDesc;
