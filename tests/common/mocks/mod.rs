pub mod ibox;
