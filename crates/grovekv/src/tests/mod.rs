mod helpers;

mod compaction_tests;
mod config_tests;
