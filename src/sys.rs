pub mod window;

#[cfg(target_os = "macos")]
pub mod axuielement;
#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "macos")]
pub mod observer;

#[cfg(test)]
pub mod testing;
