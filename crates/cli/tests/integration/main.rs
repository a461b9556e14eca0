mod common;
mod provision_tests;
mod release_tests;
