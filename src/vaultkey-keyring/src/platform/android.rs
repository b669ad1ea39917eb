//! Android Keystore secure store.
//!
//! Uses JNI to reach `java.security.KeyStore` with the `AndroidKeyStore`
//! provider. Keys are generated in the TEE (or StrongBox) and never leave it;
//! user authentication is enforced by the keystore itself.
//!
//! Certificate chains are stored as certificate entries named
//! `{alias}#crt{index}`, leaf first, so every blob must be a DER X.509
//! certificate.

use std::collections::HashSet;
use std::sync::{OnceLock, RwLock};

use async_trait::async_trait;
use jni::objects::{JByteArray, JObject, JObjectArray, JString, JValue};
use jni::{AttachGuard, JNIEnv, JavaVM};
use tracing::{debug, error, info, warn};
use vaultkey_crypto::{EcPublicKey, EcSignature, SignatureAlgorithm};

use crate::error::KeyringError;
use crate::ops::{authenticators, KeystoreSpec, NativeAccessDescriptor};
use crate::platform::PlatformCapabilities;
use crate::store::{ensure_algorithm, GenerateRequest, GeneratedKey, SecureStore, StoredKey};
use crate::types::{AccessPolicy, AuthContext};

/// `KeyProperties.PURPOSE_SIGN`
const PURPOSE_SIGN: i32 = 4;
/// `KeyProperties.AUTH_DEVICE_CREDENTIAL`
const AUTH_DEVICE_CREDENTIAL: i32 = 1;
/// `KeyProperties.AUTH_BIOMETRIC_STRONG`
const AUTH_BIOMETRIC_STRONG: i32 = 2;

const BUILDER_SIG_RET: &str = "Landroid/security/keystore/KeyGenParameterSpec$Builder;";

/// Global JavaVM reference, set during JNI_OnLoad or explicit initialization.
static JAVA_VM: OnceLock<JavaVM> = OnceLock::new();

/// Initialize the JNI subsystem with a JavaVM reference.
///
/// This must be called before any Android Keystore operations.
/// Typically called from JNI_OnLoad or from the Android app's initialization.
pub fn init_jni(vm: JavaVM) -> Result<(), KeyringError> {
    info!("init_jni: initializing JavaVM reference");
    JAVA_VM.set(vm).map_err(|_| {
        error!("init_jni: JavaVM already initialized");
        KeyringError::invalid_configuration("JavaVM already initialized")
    })
}

fn get_java_vm() -> Option<&'static JavaVM> {
    JAVA_VM.get()
}

/// JNI_OnLoad - called automatically when the library is loaded by Android.
#[no_mangle]
pub unsafe extern "system" fn JNI_OnLoad(
    vm: *mut jni::sys::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    info!("JNI_OnLoad: vaultkey native library loaded");

    // Safety: vm pointer is provided by the JVM and is valid
    let vm = match JavaVM::from_raw(vm) {
        Ok(vm) => vm,
        Err(e) => {
            error!("JNI_OnLoad: failed to create JavaVM wrapper: {}", e);
            return jni::sys::JNI_ERR;
        },
    };

    if let Err(e) = init_jni(vm) {
        error!("JNI_OnLoad: failed to initialize JNI: {}", e);
        return jni::sys::JNI_ERR;
    }

    jni::sys::JNI_VERSION_1_6
}

fn attach() -> Result<AttachGuard<'static>, KeyringError> {
    let vm = get_java_vm().ok_or_else(|| {
        warn!("JNI not available - call init_jni() or load the library via System.loadLibrary()");
        KeyringError::store_access("JNI not initialized")
    })?;

    vm.attach_current_thread().map_err(|e| {
        error!("failed to attach thread: {}", e);
        KeyringError::store_access(format!("JNI attach failed: {e}"))
    })
}

/// How a pending Java exception is reported when it is not one we map
/// specially.
#[derive(Debug, Clone, Copy)]
enum Fallback {
    Store,
    Generation,
    Signing,
}

/// Clear the pending Java exception, if any, and translate it.
fn take_exception(env: &mut JNIEnv<'_>, what: &str, fallback: Fallback) -> KeyringError {
    let throwable = match env.exception_occurred() {
        Ok(t) if !t.is_null() => t,
        _ => return KeyringError::store_access(format!("{what} failed")),
    };
    let _ = env.exception_clear();

    if is_instance(env, &throwable, "android/security/keystore/UserNotAuthenticatedException") {
        debug!("{what}: user not authenticated");
        return KeyringError::AuthenticationRequired;
    }
    if is_instance(env, &throwable, "android/security/keystore/StrongBoxUnavailableException") {
        return KeyringError::key_generation("StrongBox unavailable");
    }
    if is_instance(env, &throwable, "android/security/keystore/KeyPermanentlyInvalidatedException") {
        return KeyringError::signing("key permanently invalidated by an enrollment change");
    }

    let message = env
        .call_method(&throwable, "toString", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l())
        .and_then(|obj| env.get_string(&JString::from(obj)).map(String::from))
        .unwrap_or_else(|_| "unknown exception".to_string());

    error!("{what} failed: {}", message);
    let reason = format!("{what} failed: {message}");
    match fallback {
        Fallback::Store => KeyringError::store_access(reason),
        Fallback::Generation => KeyringError::key_generation(reason),
        Fallback::Signing => KeyringError::signing(reason),
    }
}

fn is_instance(env: &mut JNIEnv<'_>, object: &JObject<'_>, class: &str) -> bool {
    env.is_instance_of(object, class).unwrap_or(false)
}

/// Run one JNI call, translating a thrown Java exception.
fn jni_call<'a, T>(
    env: &mut JNIEnv<'a>,
    what: &str,
    fallback: Fallback,
    call: impl FnOnce(&mut JNIEnv<'a>) -> jni::errors::Result<T>,
) -> Result<T, KeyringError> {
    match call(env) {
        Ok(value) => Ok(value),
        Err(jni::errors::Error::JavaException) => Err(take_exception(env, what, fallback)),
        Err(e) => {
            error!("{what} failed: {}", e);
            Err(KeyringError::store_access(format!("{what} failed: {e}")))
        },
    }
}

fn chain_entry(alias: &str, index: usize) -> String {
    format!("{alias}#crt{index}")
}

/// `KeyProperties.AUTH_*` mask for an authenticator bitmask.
fn keystore_auth_type(authenticators: u32) -> i32 {
    let mut auth_type = 0;
    if authenticators & authenticators::BIOMETRIC_STRONG != 0 {
        auth_type |= AUTH_BIOMETRIC_STRONG;
    }
    if authenticators & authenticators::DEVICE_CREDENTIAL != 0 {
        auth_type |= AUTH_DEVICE_CREDENTIAL;
    }
    auth_type
}

/// Authenticator bitmask for a `KeyProperties.AUTH_*` mask.
fn authenticators_from_auth_type(auth_type: i32) -> u32 {
    let mut mask = 0;
    if auth_type & AUTH_BIOMETRIC_STRONG != 0 {
        mask |= authenticators::BIOMETRIC_STRONG;
    }
    if auth_type & AUTH_DEVICE_CREDENTIAL != 0 {
        mask |= authenticators::DEVICE_CREDENTIAL;
    }
    mask
}

/// Android Keystore store using hardware-backed keys.
pub struct AndroidKeystore {
    capabilities: PlatformCapabilities,
    /// Aliases with an empty chain; the keystore has no entry to mark them.
    empty_chains: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for AndroidKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AndroidKeystore")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl AndroidKeystore {
    /// Create a store for a device with `capabilities`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::StoreAccess`] if JNI is not initialized or the
    /// keystore cannot be loaded.
    pub fn new(capabilities: PlatformCapabilities) -> Result<Self, KeyringError> {
        let mut env = attach()?;
        Self::get_keystore(&mut env)?;

        info!(
            strongbox = capabilities.strongbox,
            attestation = capabilities.attestation,
            "AndroidKeystore created"
        );

        Ok(Self {
            capabilities,
            empty_chains: RwLock::new(HashSet::new()),
        })
    }

    fn get_keystore<'a>(env: &mut JNIEnv<'a>) -> Result<JObject<'a>, KeyringError> {
        debug!("get_keystore: loading AndroidKeyStore");

        let keystore = jni_call(env, "KeyStore.getInstance", Fallback::Store, |env| {
            let keystore_type = env.new_string("AndroidKeyStore")?;
            env.call_static_method(
                "java/security/KeyStore",
                "getInstance",
                "(Ljava/lang/String;)Ljava/security/KeyStore;",
                &[JValue::Object(&keystore_type)],
            )?
            .l()
        })?;

        jni_call(env, "KeyStore.load", Fallback::Store, |env| {
            env.call_method(
                &keystore,
                "load",
                "(Ljava/security/KeyStore$LoadStoreParameter;)V",
                &[JValue::Object(&JObject::null())],
            )
        })?;

        Ok(keystore)
    }

    fn contains_alias(env: &mut JNIEnv<'_>, keystore: &JObject<'_>, alias: &str) -> Result<bool, KeyringError> {
        jni_call(env, "containsAlias", Fallback::Store, |env| {
            let alias_str = env.new_string(alias)?;
            env.call_method(
                keystore,
                "containsAlias",
                "(Ljava/lang/String;)Z",
                &[JValue::Object(&alias_str)],
            )?
            .z()
        })
    }

    fn delete_entry(env: &mut JNIEnv<'_>, keystore: &JObject<'_>, alias: &str) -> Result<(), KeyringError> {
        jni_call(env, "deleteEntry", Fallback::Store, |env| {
            let alias_str = env.new_string(alias)?;
            env.call_method(
                keystore,
                "deleteEntry",
                "(Ljava/lang/String;)V",
                &[JValue::Object(&alias_str)],
            )?;
            Ok(())
        })
    }

    fn delete_chain_entries(env: &mut JNIEnv<'_>, keystore: &JObject<'_>, alias: &str) -> Result<(), KeyringError> {
        let mut index = 0;
        while Self::contains_alias(env, keystore, &chain_entry(alias, index))? {
            Self::delete_entry(env, keystore, &chain_entry(alias, index))?;
            index += 1;
        }
        Ok(())
    }

    fn certificate<'a>(
        env: &mut JNIEnv<'a>,
        keystore: &JObject<'_>,
        alias: &str,
    ) -> Result<Option<JObject<'a>>, KeyringError> {
        let cert = jni_call(env, "getCertificate", Fallback::Store, |env| {
            let alias_str = env.new_string(alias)?;
            env.call_method(
                keystore,
                "getCertificate",
                "(Ljava/lang/String;)Ljava/security/cert/Certificate;",
                &[JValue::Object(&alias_str)],
            )?
            .l()
        })?;
        Ok((!cert.is_null()).then_some(cert))
    }

    fn encoded(env: &mut JNIEnv<'_>, object: &JObject<'_>, what: &str) -> Result<Vec<u8>, KeyringError> {
        jni_call(env, what, Fallback::Store, |env| {
            let encoded = JByteArray::from(env.call_method(object, "getEncoded", "()[B", &[])?.l()?);
            env.convert_byte_array(&encoded)
        })
    }

    fn public_key(env: &mut JNIEnv<'_>, keystore: &JObject<'_>, alias: &str) -> Result<EcPublicKey, KeyringError> {
        let cert = Self::certificate(env, keystore, alias)?
            .ok_or_else(|| KeyringError::key_not_found(alias))?;

        let public_key = jni_call(env, "getPublicKey", Fallback::Store, |env| {
            env.call_method(&cert, "getPublicKey", "()Ljava/security/PublicKey;", &[])?
                .l()
        })?;

        let spki = Self::encoded(env, &public_key, "PublicKey.getEncoded")?;
        Ok(EcPublicKey::from_spki_der(&spki)?)
    }

    fn private_key<'a>(env: &mut JNIEnv<'a>, keystore: &JObject<'_>, alias: &str) -> Result<JObject<'a>, KeyringError> {
        let key = jni_call(env, "getKey", Fallback::Store, |env| {
            let alias_str = env.new_string(alias)?;
            env.call_method(
                keystore,
                "getKey",
                "(Ljava/lang/String;[C)Ljava/security/Key;",
                &[JValue::Object(&alias_str), JValue::Object(&JObject::null())],
            )?
            .l()
        })?;

        if key.is_null() {
            return Err(KeyringError::key_not_found(alias));
        }
        Ok(key)
    }

    /// Read the key's authentication parameters back from `KeyInfo`.
    fn stored_policy(env: &mut JNIEnv<'_>, private_key: &JObject<'_>) -> Result<AccessPolicy, KeyringError> {
        let info = jni_call(env, "KeyFactory.getKeySpec", Fallback::Store, |env| {
            let algorithm = env
                .call_method(private_key, "getAlgorithm", "()Ljava/lang/String;", &[])?
                .l()?;
            let provider = env.new_string("AndroidKeyStore")?;
            let factory = env
                .call_static_method(
                    "java/security/KeyFactory",
                    "getInstance",
                    "(Ljava/lang/String;Ljava/lang/String;)Ljava/security/KeyFactory;",
                    &[JValue::Object(&algorithm), JValue::Object(&provider)],
                )?
                .l()?;
            let key_info_class = env.find_class("android/security/keystore/KeyInfo")?;
            env.call_method(
                &factory,
                "getKeySpec",
                "(Ljava/security/Key;Ljava/lang/Class;)Ljava/security/spec/KeySpec;",
                &[JValue::Object(private_key), JValue::Object(&key_info_class)],
            )?
            .l()
        })?;

        let (required, validity, auth_type) = jni_call(env, "KeyInfo", Fallback::Store, |env| {
            let required = env
                .call_method(&info, "isUserAuthenticationRequired", "()Z", &[])?
                .z()?;
            let validity = env
                .call_method(&info, "getUserAuthenticationValidityDurationSeconds", "()I", &[])?
                .i()?;
            let auth_type = env
                .call_method(&info, "getUserAuthenticationType", "()I", &[])?
                .i()?;
            Ok((required, validity, auth_type))
        })?;

        let spec = KeystoreSpec {
            user_authentication_required: required,
            auth_validity_seconds: u32::try_from(validity).unwrap_or(0),
            authenticators: authenticators_from_auth_type(auth_type),
            strongbox: false,
            invalidated_by_biometric_enrollment: false,
        };
        Ok(spec.access_policy())
    }

    fn attestation_chain(env: &mut JNIEnv<'_>, keystore: &JObject<'_>, alias: &str) -> Result<Vec<Vec<u8>>, KeyringError> {
        let chain = jni_call(env, "getCertificateChain", Fallback::Store, |env| {
            let alias_str = env.new_string(alias)?;
            env.call_method(
                keystore,
                "getCertificateChain",
                "(Ljava/lang/String;)[Ljava/security/cert/Certificate;",
                &[JValue::Object(&alias_str)],
            )?
            .l()
        })?;

        if chain.is_null() {
            return Err(KeyringError::attestation_unavailable(format!(
                "no attestation chain for {alias}"
            )));
        }

        let chain = JObjectArray::from(chain);
        let len = jni_call(env, "get_array_length", Fallback::Store, |env| env.get_array_length(&chain))?;

        let mut certs = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
        for i in 0..len {
            let cert = jni_call(env, "get_object_array_element", Fallback::Store, |env| {
                env.get_object_array_element(&chain, i)
            })?;
            certs.push(Self::encoded(env, &cert, "Certificate.getEncoded")?);
        }

        debug!(alias = %alias, chain_len = certs.len(), "Attestation chain retrieved");
        Ok(certs)
    }

    fn build_spec<'a>(
        env: &mut JNIEnv<'a>,
        request: &GenerateRequest,
        spec: &KeystoreSpec,
    ) -> Result<JObject<'a>, KeyringError> {
        let g = Fallback::Generation;

        let builder = jni_call(env, "KeyGenParameterSpec.Builder", g, |env| {
            let alias_str = env.new_string(&request.alias)?;
            env.new_object(
                "android/security/keystore/KeyGenParameterSpec$Builder",
                "(Ljava/lang/String;I)V",
                &[JValue::Object(&alias_str), JValue::Int(PURPOSE_SIGN)],
            )
        })?;

        // The curve comes from the algorithm, never from a key size.
        jni_call(env, "setAlgorithmParameterSpec", g, |env| {
            let curve_name = env.new_string(request.algorithm.curve().sec_name())?;
            let curve = env.new_object(
                "java/security/spec/ECGenParameterSpec",
                "(Ljava/lang/String;)V",
                &[JValue::Object(&curve_name)],
            )?;
            env.call_method(
                &builder,
                "setAlgorithmParameterSpec",
                format!("(Ljava/security/spec/AlgorithmParameterSpec;){BUILDER_SIG_RET}"),
                &[JValue::Object(&curve)],
            )
        })?;

        jni_call(env, "setDigests", g, |env| {
            let digest = env.new_string(request.algorithm.digest_name())?;
            let digests = env.new_object_array(1, "java/lang/String", &digest)?;
            env.call_method(
                &builder,
                "setDigests",
                format!("([Ljava/lang/String;){BUILDER_SIG_RET}"),
                &[JValue::Object(&digests)],
            )
        })?;

        if spec.user_authentication_required {
            if spec.auth_validity_seconds == 0 {
                return Err(KeyringError::policy_unsupported(
                    "keystore keys cannot require authentication for every operation",
                ));
            }
            let validity = i32::try_from(spec.auth_validity_seconds).unwrap_or(i32::MAX);

            jni_call(env, "setUserAuthenticationParameters", g, |env| {
                env.call_method(
                    &builder,
                    "setUserAuthenticationRequired",
                    format!("(Z){BUILDER_SIG_RET}"),
                    &[JValue::Bool(1)],
                )?;
                env.call_method(
                    &builder,
                    "setUserAuthenticationParameters",
                    format!("(II){BUILDER_SIG_RET}"),
                    &[
                        JValue::Int(validity),
                        JValue::Int(keystore_auth_type(spec.authenticators)),
                    ],
                )?;
                env.call_method(
                    &builder,
                    "setInvalidatedByBiometricEnrollment",
                    format!("(Z){BUILDER_SIG_RET}"),
                    &[JValue::Bool(u8::from(spec.invalidated_by_biometric_enrollment))],
                )
            })?;
        }

        if let Some(challenge) = &request.attestation_challenge {
            jni_call(env, "setAttestationChallenge", g, |env| {
                let challenge = env.byte_array_from_slice(challenge)?;
                env.call_method(
                    &builder,
                    "setAttestationChallenge",
                    format!("([B){BUILDER_SIG_RET}"),
                    &[JValue::Object(&challenge)],
                )
            })?;
        }

        if spec.strongbox {
            jni_call(env, "setIsStrongBoxBacked", g, |env| {
                env.call_method(
                    &builder,
                    "setIsStrongBoxBacked",
                    format!("(Z){BUILDER_SIG_RET}"),
                    &[JValue::Bool(1)],
                )
            })?;
        }

        jni_call(env, "KeyGenParameterSpec.build", g, |env| {
            env.call_method(
                &builder,
                "build",
                "()Landroid/security/keystore/KeyGenParameterSpec;",
                &[],
            )?
            .l()
        })
    }

    fn set_empty_chain(&self, alias: &str, empty: bool) -> Result<(), KeyringError> {
        let mut chains = self
            .empty_chains
            .write()
            .map_err(|_| KeyringError::store_access("Lock poisoned"))?;
        if empty {
            chains.insert(alias.to_string());
        } else {
            chains.remove(alias);
        }
        Ok(())
    }
}

#[async_trait]
impl SecureStore for AndroidKeystore {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities.clone()
    }

    async fn contains(&self, alias: &str) -> Result<bool, KeyringError> {
        let mut env = attach()?;
        let keystore = Self::get_keystore(&mut env)?;
        let exists = Self::contains_alias(&mut env, &keystore, alias)?;
        debug!(alias = %alias, exists, "Key existence check complete");
        Ok(exists)
    }

    async fn delete(&self, alias: &str) -> Result<(), KeyringError> {
        let mut env = attach()?;
        let keystore = Self::get_keystore(&mut env)?;

        if Self::contains_alias(&mut env, &keystore, alias)? {
            Self::delete_entry(&mut env, &keystore, alias)?;
            info!(alias = %alias, "Key deleted from Android Keystore");
        }
        Ok(())
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedKey, KeyringError> {
        let NativeAccessDescriptor::Keystore(spec) = request.descriptor else {
            return Err(KeyringError::policy_unsupported(format!(
                "Android Keystore cannot apply {:?}",
                request.descriptor
            )));
        };
        if request.attestation_challenge.is_some() && !self.capabilities.attestation {
            return Err(KeyringError::attestation_unavailable("device has no key attestation"));
        }

        info!(
            alias = %request.alias,
            algorithm = %request.algorithm,
            strongbox = spec.strongbox,
            user_auth = spec.user_authentication_required,
            "Generating key in Android Keystore"
        );

        let mut env = attach()?;
        let parameter_spec = Self::build_spec(&mut env, &request, &spec)?;

        jni_call(&mut env, "generateKeyPair", Fallback::Generation, |env| {
            let algo_str = env.new_string("EC")?;
            let provider_str = env.new_string("AndroidKeyStore")?;
            let key_pair_gen = env
                .call_static_method(
                    "java/security/KeyPairGenerator",
                    "getInstance",
                    "(Ljava/lang/String;Ljava/lang/String;)Ljava/security/KeyPairGenerator;",
                    &[JValue::Object(&algo_str), JValue::Object(&provider_str)],
                )?
                .l()?;
            env.call_method(
                &key_pair_gen,
                "initialize",
                "(Ljava/security/spec/AlgorithmParameterSpec;)V",
                &[JValue::Object(&parameter_spec)],
            )?;
            env.call_method(&key_pair_gen, "generateKeyPair", "()Ljava/security/KeyPair;", &[])
        })?;

        let keystore = Self::get_keystore(&mut env)?;
        let public_key = Self::public_key(&mut env, &keystore, &request.alias)?;
        let attestation_chain = if request.attestation_challenge.is_some() {
            Self::attestation_chain(&mut env, &keystore, &request.alias)?
        } else {
            Vec::new()
        };

        info!(
            alias = %request.alias,
            attested = !attestation_chain.is_empty(),
            "Key generated successfully in Android Keystore"
        );

        Ok(GeneratedKey {
            public_key,
            attestation_chain,
        })
    }

    async fn load(&self, alias: &str) -> Result<Option<StoredKey>, KeyringError> {
        let mut env = attach()?;
        let keystore = Self::get_keystore(&mut env)?;
        if !Self::contains_alias(&mut env, &keystore, alias)? {
            return Ok(None);
        }

        let public_key = Self::public_key(&mut env, &keystore, alias)?;
        let private_key = Self::private_key(&mut env, &keystore, alias)?;
        let policy = Self::stored_policy(&mut env, &private_key)?;

        Ok(Some(StoredKey {
            algorithm: public_key.curve().signature_algorithm(),
            public_key,
            policy,
        }))
    }

    async fn sign(
        &self,
        alias: &str,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        auth: Option<&AuthContext>,
    ) -> Result<EcSignature, KeyringError> {
        debug!(alias = %alias, algorithm = %algorithm, authenticated = auth.is_some(), "Android Keystore sign");

        let mut env = attach()?;
        let keystore = Self::get_keystore(&mut env)?;

        let public_key = Self::public_key(&mut env, &keystore, alias)?;
        ensure_algorithm(alias, public_key.curve().signature_algorithm(), algorithm)?;
        let private_key = Self::private_key(&mut env, &keystore, alias)?;

        let der = jni_call(&mut env, "Signature.sign", Fallback::Signing, |env| {
            let algo_str = env.new_string(algorithm.jca_name())?;
            let signature = env
                .call_static_method(
                    "java/security/Signature",
                    "getInstance",
                    "(Ljava/lang/String;)Ljava/security/Signature;",
                    &[JValue::Object(&algo_str)],
                )?
                .l()?;
            env.call_method(
                &signature,
                "initSign",
                "(Ljava/security/PrivateKey;)V",
                &[JValue::Object(&private_key)],
            )?;

            let data_array = env.byte_array_from_slice(data)?;
            env.call_method(&signature, "update", "([B)V", &[JValue::Object(&data_array)])?;

            let signed = JByteArray::from(env.call_method(&signature, "sign", "()[B", &[])?.l()?);
            env.convert_byte_array(&signed)
        })?;

        info!(alias = %alias, "Signature created successfully");
        Ok(EcSignature::from_der(algorithm, &der)?)
    }

    async fn store_chain(&self, alias: &str, chain: &[Vec<u8>]) -> Result<(), KeyringError> {
        let mut env = attach()?;
        let keystore = Self::get_keystore(&mut env)?;
        Self::delete_chain_entries(&mut env, &keystore, alias)?;

        let factory = jni_call(&mut env, "CertificateFactory.getInstance", Fallback::Store, |env| {
            let x509 = env.new_string("X.509")?;
            env.call_static_method(
                "java/security/cert/CertificateFactory",
                "getInstance",
                "(Ljava/lang/String;)Ljava/security/cert/CertificateFactory;",
                &[JValue::Object(&x509)],
            )?
            .l()
        })?;

        for (index, der) in chain.iter().enumerate() {
            jni_call(&mut env, "setCertificateEntry", Fallback::Store, |env| {
                let bytes = env.byte_array_from_slice(der)?;
                let stream = env.new_object("java/io/ByteArrayInputStream", "([B)V", &[JValue::Object(&bytes)])?;
                let cert = env
                    .call_method(
                        &factory,
                        "generateCertificate",
                        "(Ljava/io/InputStream;)Ljava/security/cert/Certificate;",
                        &[JValue::Object(&stream)],
                    )?
                    .l()?;
                let entry = env.new_string(chain_entry(alias, index))?;
                env.call_method(
                    &keystore,
                    "setCertificateEntry",
                    "(Ljava/lang/String;Ljava/security/cert/Certificate;)V",
                    &[JValue::Object(&entry), JValue::Object(&cert)],
                )?;
                Ok(())
            })?;
        }

        self.set_empty_chain(alias, chain.is_empty())?;
        info!(alias = %alias, chain_len = chain.len(), "Certificate chain stored in Android Keystore");
        Ok(())
    }

    async fn load_chain(&self, alias: &str) -> Result<Option<Vec<Vec<u8>>>, KeyringError> {
        let mut env = attach()?;
        let keystore = Self::get_keystore(&mut env)?;

        let mut chain = Vec::new();
        while let Some(cert) = Self::certificate(&mut env, &keystore, &chain_entry(alias, chain.len()))? {
            chain.push(Self::encoded(&mut env, &cert, "Certificate.getEncoded")?);
        }

        if chain.is_empty() {
            let known_empty = self
                .empty_chains
                .read()
                .map_err(|_| KeyringError::store_access("Lock poisoned"))?
                .contains(alias);
            return Ok(known_empty.then(Vec::new));
        }
        Ok(Some(chain))
    }
}
