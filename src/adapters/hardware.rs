//! Hardware adapter: bridges board peripherals to domain port traits.
//!
//! [`L298nPump`] drives the transfer pump through an L298N H-bridge using
//! `embedded-hal` 1.0 traits: IN1/IN2 select direction, ENA carries the
//! PWM duty. [`HardwareAdapter`] pairs a transducer with the pump so the
//! control loop can borrow both through one `&mut`. This is the only
//! module that touches pins; board bring-up hands it ready HAL objects.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

use crate::app::ports::{ActuatorPort, RawReadError, SensorPort};
use crate::error::ActuatorError;

/// One channel of an L298N dual H-bridge.
pub struct L298nPump<EN, IN1, IN2> {
    enable: EN,
    in1: IN1,
    in2: IN2,
}

impl<EN, IN1, IN2> L298nPump<EN, IN1, IN2>
where
    EN: SetDutyCycle,
    IN1: OutputPin,
    IN2: OutputPin,
{
    pub fn new(enable: EN, in1: IN1, in2: IN2) -> Self {
        Self { enable, in1, in2 }
    }

    pub fn release(self) -> (EN, IN1, IN2) {
        (self.enable, self.in1, self.in2)
    }
}

impl<EN, IN1, IN2> ActuatorPort for L298nPump<EN, IN1, IN2>
where
    EN: SetDutyCycle,
    IN1: OutputPin,
    IN2: OutputPin,
{
    fn drive_pump(&mut self, duty_percent: u8) -> Result<(), ActuatorError> {
        // Forward: IN1 high, IN2 low.
        self.in2
            .set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        self.in1
            .set_high()
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        self.enable
            .set_duty_cycle_percent(duty_percent.min(100))
            .map_err(|_| ActuatorError::PwmWriteFailed)
    }

    fn stop_pump(&mut self) -> Result<(), ActuatorError> {
        // Every step is attempted even if an earlier one fails; any one of
        // them de-energises the motor.
        let pwm = self
            .enable
            .set_duty_cycle_fully_off()
            .map_err(|_| ActuatorError::PwmWriteFailed);
        let in1 = self
            .in1
            .set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed);
        let in2 = self
            .in2
            .set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed);
        pwm.and(in1).and(in2)
    }
}

/// Concrete adapter that combines the transducer and the pump behind the
/// port traits.
pub struct HardwareAdapter<S, P> {
    sensor: S,
    pump: P,
}

impl<S: SensorPort, P: ActuatorPort> HardwareAdapter<S, P> {
    pub fn new(sensor: S, pump: P) -> Self {
        Self { sensor, pump }
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn pump_mut(&mut self) -> &mut P {
        &mut self.pump
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<S: SensorPort, P> SensorPort for HardwareAdapter<S, P> {
    fn read_raw(&mut self) -> Result<u16, RawReadError> {
        self.sensor.read_raw()
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<S, P: ActuatorPort> ActuatorPort for HardwareAdapter<S, P> {
    fn drive_pump(&mut self, duty_percent: u8) -> Result<(), ActuatorError> {
        self.pump.drive_pump(duty_percent)
    }

    fn stop_pump(&mut self) -> Result<(), ActuatorError> {
        self.pump.stop_pump()
    }
}
