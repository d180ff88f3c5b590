
mod criteria_tests;
