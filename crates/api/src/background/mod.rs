pub mod progress_sweeper;
