use std::error::Error as StdError;
use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::{self, NonNull};

use objc2_application_services::{AXError, AXUIElement as RawAXUIElement, AXValue, AXValueType};
use objc2_core_foundation::{
    CFArray, CFBoolean, CFRetained, CFString, CFType, CGRect, ConcreteType,
};

#[allow(non_camel_case_types)]
pub type pid_t = i32;

pub const AX_BUTTON_ROLE: &str = "AXButton";

/// Owned wrapper around an accessibility element with typed attribute
/// accessors for the handful of attributes we care about.
#[derive(Clone)]
pub struct AXUIElement {
    inner: CFRetained<RawAXUIElement>,
}

#[derive(Debug, Clone)]
pub enum Error {
    Ax(AXError),
    NotFound,
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Ax(err) => write!(f, "AX error {err:?}"),
            Error::NotFound => write!(f, "value not found"),
        }
    }
}

impl StdError for Error {}

impl From<AXError> for Error {
    fn from(value: AXError) -> Self {
        Self::Ax(value)
    }
}

impl AXUIElement {
    fn new(inner: CFRetained<RawAXUIElement>) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn application(pid: pid_t) -> Self {
        // SAFETY: The returned object follows the Create rule and therefore
        // owns +1 retain count.
        let inner = unsafe { RawAXUIElement::new_application(pid) };
        Self::new(inner)
    }

    #[allow(non_snake_case)]
    #[inline]
    pub fn as_concrete_TypeRef(&self) -> &RawAXUIElement {
        self.deref()
    }

    #[inline]
    pub fn raw_ptr(&self) -> NonNull<RawAXUIElement> {
        CFRetained::as_ptr(&self.inner)
    }

    #[inline]
    pub unsafe fn from_get_rule(ptr: *const RawAXUIElement) -> Self {
        let ptr = NonNull::new(ptr.cast_mut()).expect("attempted to create a NULL object");
        let retained = unsafe { CFRetained::retain(ptr) };
        Self::new(retained)
    }

    /// The pid of the application this element belongs to.
    pub fn pid(&self) -> Result<pid_t> {
        let mut pid: pid_t = 0;
        let status = unsafe { AXUIElementGetPid(self.raw_ptr().as_ptr(), &mut pid) };
        if status == AXError::Success {
            Ok(pid)
        } else {
            Err(Error::Ax(status))
        }
    }

    /// The window server id of this window, stable across AX lookups.
    pub fn window_id(&self) -> Result<u32> {
        let mut wid: u32 = 0;
        let status = unsafe { _AXUIElementGetWindow(self.raw_ptr().as_ptr(), &mut wid) };
        if status == AXError::Success && wid != 0 {
            Ok(wid)
        } else {
            Err(Error::Ax(status))
        }
    }

    fn copy_attribute(&self, name: &'static str) -> Result<Option<CFRetained<CFType>>> {
        let attr = CFString::from_static_str(name);
        let mut value: *const CFType = ptr::null();
        let status = unsafe {
            self.inner.copy_attribute_value(
                attr.as_ref(),
                NonNull::new((&mut value) as *mut *const CFType)
                    .expect("pointer to local is never null"),
            )
        };
        match status {
            AXError::Success => {
                if value.is_null() {
                    Ok(None)
                } else {
                    // SAFETY: The function follows the Copy rule and returns
                    // a value the caller owns.
                    let retained = unsafe {
                        CFRetained::from_raw(
                            NonNull::new(value as *mut CFType).expect("non-null value pointer"),
                        )
                    };
                    Ok(Some(retained))
                }
            }
            AXError::NoValue => Ok(None),
            err => Err(Error::Ax(err)),
        }
    }

    fn copy_required_attribute(&self, name: &'static str) -> Result<CFRetained<CFType>> {
        self.copy_attribute(name)?.ok_or(Error::NotFound)
    }

    fn downcast<T: ConcreteType>(&self, value: CFRetained<CFType>) -> Result<CFRetained<T>> {
        value.downcast::<T>().map_err(|_| Error::Ax(AXError::Failure))
    }

    fn string_attribute(&self, name: &'static str) -> Result<String> {
        let value = self.copy_required_attribute(name)?;
        let string = self.downcast::<CFString>(value)?;
        Ok(string.to_string())
    }

    fn element_array_attribute(&self, name: &'static str) -> Result<Vec<AXUIElement>> {
        let Some(value) = self.copy_attribute(name)? else {
            return Ok(Vec::new());
        };
        let array = self.downcast::<CFArray>(value)?;
        let array = unsafe { CFRetained::cast_unchecked::<CFArray<CFType>>(array) };
        let mut out = Vec::with_capacity(array.len());
        for entry in array.iter() {
            let elem = self.downcast::<RawAXUIElement>(entry)?;
            out.push(AXUIElement::new(elem));
        }
        Ok(out)
    }

    pub fn role(&self) -> Result<String> {
        self.string_attribute("AXRole")
    }

    pub fn title(&self) -> Result<String> {
        self.string_attribute("AXTitle")
    }

    pub fn description(&self) -> Result<String> {
        self.string_attribute("AXDescription")
    }

    pub fn minimized(&self) -> Result<bool> {
        let value = self.copy_required_attribute("AXMinimized")?;
        let boolean = self.downcast::<CFBoolean>(value)?;
        Ok(boolean.value())
    }

    pub fn enabled(&self) -> Result<bool> {
        let value = self.copy_required_attribute("AXEnabled")?;
        let boolean = self.downcast::<CFBoolean>(value)?;
        Ok(boolean.value())
    }

    pub fn frame(&self) -> Result<CGRect> {
        let value = self.copy_required_attribute("AXFrame")?;
        let ax_value = self.downcast::<AXValue>(value)?;
        let mut rect = CGRect::default();
        let success = unsafe {
            ax_value.value(
                AXValueType::CGRect,
                NonNull::new((&mut rect as *mut CGRect).cast::<c_void>()).expect("rect pointer"),
            )
        };
        if success {
            Ok(rect)
        } else {
            Err(Error::Ax(AXError::Failure))
        }
    }

    pub fn focused_window(&self) -> Result<AXUIElement> {
        let value = self.copy_required_attribute("AXFocusedWindow")?;
        let element = self.downcast::<RawAXUIElement>(value)?;
        Ok(AXUIElement::new(element))
    }

    pub fn windows(&self) -> Result<Vec<AXUIElement>> {
        self.element_array_attribute("AXWindows")
    }

    pub fn children(&self) -> Result<Vec<AXUIElement>> {
        self.element_array_attribute("AXChildren")
    }

    fn perform(&self, action: &'static str) -> Result<()> {
        let action = CFString::from_static_str(action);
        let status = unsafe { self.inner.perform_action(action.as_ref()) };
        if status == AXError::Success {
            Ok(())
        } else {
            Err(Error::Ax(status))
        }
    }

    pub fn raise(&self) -> Result<()> {
        self.perform("AXRaise")
    }

    pub fn press(&self) -> Result<()> {
        self.perform("AXPress")
    }
}

impl Deref for AXUIElement {
    type Target = RawAXUIElement;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl PartialEq for AXUIElement {
    fn eq(&self, other: &Self) -> bool {
        self.raw_ptr() == other.raw_ptr()
    }
}

impl Eq for AXUIElement {}

impl Hash for AXUIElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw_ptr().hash(state);
    }
}

impl fmt::Debug for AXUIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

#[allow(non_snake_case)]
#[link(name = "ApplicationServices", kind = "framework")]
unsafe extern "C" {
    fn AXUIElementGetPid(element: *mut RawAXUIElement, pid: *mut pid_t) -> AXError;

    // Private but stable; the only way to map an AX window to its window
    // server id.
    fn _AXUIElementGetWindow(element: *mut RawAXUIElement, wid: *mut u32) -> AXError;
}
