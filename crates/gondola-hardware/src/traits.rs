//! Serial channel trait definition.

/// Non-blocking integer link to the microcontroller.
///
/// Unlike an async device trait, the protocol engine is driven by a polling
/// loop and calls the link synchronously, so the trait is plain and
/// object-safe.
///
/// # Examples
///
/// ```
/// use gondola_hardware::SerialChannel;
///
/// fn handshake<C: SerialChannel>(link: &mut C) -> bool {
///     match link.try_read_int() {
///         Some(0) => link.write_int(1),
///         _ => false,
///     }
/// }
/// ```
pub trait SerialChannel: Send {
    /// Read one integer if a complete value is available.
    ///
    /// Returns `None` on no data, on a line that is not an integer, or when
    /// the link is absent.
    fn try_read_int(&mut self) -> Option<i64>;

    /// Write one integer followed by a newline.
    ///
    /// Returns `false` if the value could not be written.
    fn write_int(&mut self, value: i64) -> bool;

    /// Whether the underlying link is open.
    fn is_connected(&self) -> bool {
        true
    }
}

impl<C: SerialChannel + ?Sized> SerialChannel for Box<C> {
    fn try_read_int(&mut self) -> Option<i64> {
        (**self).try_read_int()
    }

    fn write_int(&mut self, value: i64) -> bool {
        (**self).write_int(value)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
