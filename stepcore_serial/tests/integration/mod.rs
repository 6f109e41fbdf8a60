mod common;
mod end_to_end;
mod framing;
mod recovery;
mod step_stream;
