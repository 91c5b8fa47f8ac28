//! # Device Registry
//!
//! The hosted device model: character-device majors, classes and the node
//! table that `open` resolves paths against. Every call is appended to an
//! event log so tests can check registration and teardown order.

use crate::config::FailStage;
use kernel_info::device::DEVICE_DIR;
use kernel_kmap::{ClassHandle, DevNum, DeviceHandle, Major, RegistrationError};
use spin::Mutex;

const EBUSY: i32 = 16;
const ENOMEM: i32 = 12;
const EEXIST: i32 = 17;
const ENODEV: i32 = 19;

/// First major handed out; later registrations count down like the kernel's
/// dynamic allocation does.
const FIRST_DYNAMIC_MAJOR: u32 = 254;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    RegisterChrdev { major: Major, name: &'static str },
    UnregisterChrdev { major: Major },
    ClassCreate { class: ClassHandle, name: &'static str },
    ClassDestroy { class: ClassHandle },
    DeviceCreate { devnum: DevNum, path: String },
    DeviceDestroy { devnum: DevNum },
}

/// A published device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub path: String,
    pub devnum: DevNum,
    pub class: ClassHandle,
    pub handle: DeviceHandle,
}

#[derive(Default)]
struct State {
    next_major: Option<u32>,
    next_handle: u64,
    chrdevs: Vec<(Major, &'static str)>,
    classes: Vec<(ClassHandle, &'static str)>,
    nodes: Vec<DeviceNode>,
    events: Vec<RegistryEvent>,
}

impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

pub struct DeviceNodes {
    state: Mutex<State>,
    fail_at: Option<FailStage>,
}

impl DeviceNodes {
    #[must_use]
    pub fn new(fail_at: Option<FailStage>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            fail_at,
        }
    }

    /// Node published under `path`, if any.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<DeviceNode> {
        self.state.lock().nodes.iter().find(|n| n.path == path).cloned()
    }

    #[must_use]
    pub fn events(&self) -> Vec<RegistryEvent> {
        self.state.lock().events.clone()
    }

    /// Whether anything is still registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.chrdevs.is_empty() && state.classes.is_empty() && state.nodes.is_empty()
    }

    /// Take the next dynamic major for `name`.
    ///
    /// # Errors
    /// `-EBUSY` if `name` is already registered or the majors are used up.
    pub fn register_chrdev(&self, name: &'static str) -> Result<Major, RegistrationError> {
        if self.fail_at == Some(FailStage::Chrdev) {
            return Err(RegistrationError::Chrdev(-EBUSY));
        }

        let mut state = self.state.lock();
        if state.chrdevs.iter().any(|(_, n)| *n == name) {
            return Err(RegistrationError::Chrdev(-EBUSY));
        }
        let number = state.next_major.unwrap_or(FIRST_DYNAMIC_MAJOR);
        if number == 0 {
            return Err(RegistrationError::Chrdev(-EBUSY));
        }
        state.next_major = Some(number - 1);

        let major = Major::new(number);
        state.chrdevs.push((major, name));
        state.events.push(RegistryEvent::RegisterChrdev { major, name });
        Ok(major)
    }

    pub fn unregister_chrdev(&self, major: Major, name: &'static str) {
        let mut state = self.state.lock();
        let before = state.chrdevs.len();
        state.chrdevs.retain(|(m, n)| !(*m == major && *n == name));
        if state.chrdevs.len() == before {
            log::warn!("unregister_chrdev: {major} ({name}) was not registered");
        }
        state.events.push(RegistryEvent::UnregisterChrdev { major });
    }

    /// # Errors
    /// `-EEXIST` if a class of that name exists.
    pub fn class_create(&self, name: &'static str) -> Result<ClassHandle, RegistrationError> {
        if self.fail_at == Some(FailStage::Class) {
            return Err(RegistrationError::Class(-ENOMEM));
        }

        let mut state = self.state.lock();
        if state.classes.iter().any(|(_, n)| *n == name) {
            return Err(RegistrationError::Class(-EEXIST));
        }
        let class = ClassHandle(state.handle());
        state.classes.push((class, name));
        state.events.push(RegistryEvent::ClassCreate { class, name });
        Ok(class)
    }

    pub fn class_destroy(&self, class: ClassHandle) {
        let mut state = self.state.lock();
        state.classes.retain(|(c, _)| *c != class);
        state.events.push(RegistryEvent::ClassDestroy { class });
    }

    /// Publish `DEVICE_DIR/name` for `devnum`.
    ///
    /// # Errors
    /// `-ENODEV` for an unknown class, `-EEXIST` if the path or number is
    /// taken.
    pub fn device_create(
        &self,
        class: ClassHandle,
        devnum: DevNum,
        name: &'static str,
    ) -> Result<DeviceHandle, RegistrationError> {
        if self.fail_at == Some(FailStage::Device) {
            return Err(RegistrationError::Device(-ENOMEM));
        }

        let mut state = self.state.lock();
        if !state.classes.iter().any(|(c, _)| *c == class) {
            return Err(RegistrationError::Device(-ENODEV));
        }
        let path = format!("{DEVICE_DIR}/{name}");
        if state.nodes.iter().any(|n| n.path == path || n.devnum == devnum) {
            return Err(RegistrationError::Device(-EEXIST));
        }

        let handle = DeviceHandle(state.handle());
        state.nodes.push(DeviceNode {
            path: path.clone(),
            devnum,
            class,
            handle,
        });
        state.events.push(RegistryEvent::DeviceCreate { devnum, path });
        Ok(handle)
    }

    pub fn device_destroy(&self, class: ClassHandle, devnum: DevNum) {
        let mut state = self.state.lock();
        state
            .nodes
            .retain(|n| !(n.class == class && n.devnum == devnum));
        state.events.push(RegistryEvent::DeviceDestroy { devnum });
    }
}
