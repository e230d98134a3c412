mod control_loop;
mod driver;
